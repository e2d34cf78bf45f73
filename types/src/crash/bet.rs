use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, Read, ReadExt, Write};
use commonware_cryptography::ed25519::PublicKey;

use super::Multiplier;

/// Resolution state of a bet.
///
/// A bet leaves `Active` exactly once and never returns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BetStatus {
    #[default]
    Active,
    CashedOut(Multiplier),
    Crashed,
    /// Stake returned because the round was interrupted before it crashed.
    Refunded,
}

impl BetStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Write for BetStatus {
    fn write(&self, writer: &mut impl BufMut) {
        match self {
            Self::Active => 0u8.write(writer),
            Self::CashedOut(multiplier) => {
                1u8.write(writer);
                multiplier.write(writer);
            }
            Self::Crashed => 2u8.write(writer),
            Self::Refunded => 3u8.write(writer),
        }
    }
}

impl Read for BetStatus {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Active),
            1 => Ok(Self::CashedOut(Multiplier::read(reader)?)),
            2 => Ok(Self::Crashed),
            3 => Ok(Self::Refunded),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl EncodeSize for BetStatus {
    fn encode_size(&self) -> usize {
        1 + match self {
            Self::CashedOut(multiplier) => multiplier.encode_size(),
            _ => 0,
        }
    }
}

/// A single participant's wager in a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bet {
    pub id: u64,
    pub participant: PublicKey,
    pub stake: u64,
    pub auto_cashout: Option<Multiplier>,
    pub status: BetStatus,
    pub payout: u64,
}

impl Bet {
    pub fn new(
        id: u64,
        participant: PublicKey,
        stake: u64,
        auto_cashout: Option<Multiplier>,
    ) -> Self {
        Self {
            id,
            participant,
            stake,
            auto_cashout,
            status: BetStatus::Active,
            payout: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Multiplier the bet was settled at, if it was cashed out.
    pub fn cashout_multiplier(&self) -> Option<Multiplier> {
        match self.status {
            BetStatus::CashedOut(multiplier) => Some(multiplier),
            _ => None,
        }
    }
}

impl Write for Bet {
    fn write(&self, writer: &mut impl BufMut) {
        self.id.write(writer);
        self.participant.write(writer);
        self.stake.write(writer);
        match &self.auto_cashout {
            Some(threshold) => {
                true.write(writer);
                threshold.write(writer);
            }
            None => false.write(writer),
        }
        self.status.write(writer);
        self.payout.write(writer);
    }
}

impl Read for Bet {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        let id = u64::read(reader)?;
        let participant = PublicKey::read(reader)?;
        let stake = u64::read(reader)?;
        let auto_cashout = if bool::read(reader)? {
            Some(Multiplier::read(reader)?)
        } else {
            None
        };
        Ok(Self {
            id,
            participant,
            stake,
            auto_cashout,
            status: BetStatus::read(reader)?,
            payout: u64::read(reader)?,
        })
    }
}

impl EncodeSize for Bet {
    fn encode_size(&self) -> usize {
        self.id.encode_size()
            + self.participant.encode_size()
            + self.stake.encode_size()
            + 1
            + self
                .auto_cashout
                .as_ref()
                .map_or(0, |threshold| threshold.encode_size())
            + self.status.encode_size()
            + self.payout.encode_size()
    }
}
