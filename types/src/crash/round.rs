use bytes::{Buf, BufMut};
use commonware_codec::{EncodeSize, Error, FixedSize, Read, ReadExt, Write};
use commonware_cryptography::sha256::Digest;

use super::{read_seed, seed_encode_size, write_seed, Multiplier};

/// Lifecycle phase of a round. Phases only ever advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Phase {
    #[default]
    Waiting = 0,
    Betting = 1,
    Flying = 2,
    Crashed = 3,
}

impl Write for Phase {
    fn write(&self, writer: &mut impl BufMut) {
        (*self as u8).write(writer);
    }
}

impl Read for Phase {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        match u8::read(reader)? {
            0 => Ok(Self::Waiting),
            1 => Ok(Self::Betting),
            2 => Ok(Self::Flying),
            3 => Ok(Self::Crashed),
            i => Err(Error::InvalidEnum(i)),
        }
    }
}

impl FixedSize for Phase {
    const SIZE: usize = 1;
}

/// Immutable record of a completed round, with the server seed revealed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundSummary {
    pub round_id: u64,
    pub nonce: u64,
    pub server_seed: String,
    pub server_seed_hash: Digest,
    pub client_seed: String,
    pub crash_point: Multiplier,
    /// Unix timestamp (milliseconds) when the round crashed
    pub crashed_at_ms: u64,
    pub total_staked: u64,
    pub total_paid_out: u64,
    pub bets: u32,
    pub cashed_out: u32,
}

impl Write for RoundSummary {
    fn write(&self, writer: &mut impl BufMut) {
        self.round_id.write(writer);
        self.nonce.write(writer);
        write_seed(&self.server_seed, writer);
        self.server_seed_hash.write(writer);
        write_seed(&self.client_seed, writer);
        self.crash_point.write(writer);
        self.crashed_at_ms.write(writer);
        self.total_staked.write(writer);
        self.total_paid_out.write(writer);
        self.bets.write(writer);
        self.cashed_out.write(writer);
    }
}

impl Read for RoundSummary {
    type Cfg = ();

    fn read_cfg(reader: &mut impl Buf, _: &Self::Cfg) -> Result<Self, Error> {
        Ok(Self {
            round_id: u64::read(reader)?,
            nonce: u64::read(reader)?,
            server_seed: read_seed(reader)?,
            server_seed_hash: Digest::read(reader)?,
            client_seed: read_seed(reader)?,
            crash_point: Multiplier::read(reader)?,
            crashed_at_ms: u64::read(reader)?,
            total_staked: u64::read(reader)?,
            total_paid_out: u64::read(reader)?,
            bets: u32::read(reader)?,
            cashed_out: u32::read(reader)?,
        })
    }
}

impl EncodeSize for RoundSummary {
    fn encode_size(&self) -> usize {
        self.round_id.encode_size()
            + self.nonce.encode_size()
            + seed_encode_size(&self.server_seed)
            + self.server_seed_hash.encode_size()
            + seed_encode_size(&self.client_seed)
            + self.crash_point.encode_size()
            + self.crashed_at_ms.encode_size()
            + self.total_staked.encode_size()
            + self.total_paid_out.encode_size()
            + self.bets.encode_size()
            + self.cashed_out.encode_size()
    }
}
