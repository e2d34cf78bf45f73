mod bet;
mod codec;
mod constants;
mod multiplier;
mod round;

pub use bet::*;
pub use codec::{read_seed, seed_encode_size, write_seed};
pub use constants::*;
pub use multiplier::*;
pub use round::*;
