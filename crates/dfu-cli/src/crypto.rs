//! Placeholder `ChallengeCrypto` for this CLI. Real deployments supply a
//! collaborator backed by the device's actual public key; this one XORs
//! against a shared byte so the CLI can interoperate with `dfu-target-sim`
//! (which decrypts the same way) without pulling a crypto crate into a
//! workspace that otherwise has no use for one.

use dfu_client::ChallengeCrypto;

pub struct XorChallengeCrypto {
    key: u8,
}

impl XorChallengeCrypto {
    pub fn new(key: u8) -> Self {
        XorChallengeCrypto { key }
    }
}

impl ChallengeCrypto for XorChallengeCrypto {
    fn encrypt_challenge(&mut self, challenge: u32) -> heapless::Vec<u8, 256> {
        let mut out = heapless::Vec::new();
        for byte in challenge.to_le_bytes() {
            let _ = out.push(byte ^ self.key);
        }
        out
    }
}
