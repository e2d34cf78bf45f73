use crate::fairness::{hash_seed, Commitment};
use commonware_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    PrivateKeyExt, Signer,
};
use rand::{rngs::StdRng, SeedableRng};

/// Creates a participant keypair from a seed
pub fn create_participant_keypair(seed: u64) -> (PrivateKey, PublicKey) {
    let mut rng = StdRng::seed_from_u64(seed);
    let private = PrivateKey::from_rng(&mut rng);
    let public = private.public_key();
    (private, public)
}

/// Creates a participant identity from a seed
pub fn create_participant(seed: u64) -> PublicKey {
    create_participant_keypair(seed).1
}

/// Commitment over the well-known `abc` / `xyz` seeds with the given nonce
pub fn fixed_commitment(nonce: u64) -> Commitment {
    Commitment {
        server_seed: "abc".to_string(),
        server_seed_hash: hash_seed("abc"),
        client_seed: "xyz".to_string(),
        nonce,
    }
}
