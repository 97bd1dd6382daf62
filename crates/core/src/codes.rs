use std::sync::Arc;

use rand::Rng;

/// 32-symbol alphabet with the visually ambiguous characters removed
/// (no `0`/`O`, no `1`/`I`), so codes survive being read aloud or copied
/// from paper.
const CODE_ALPHABET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Six symbols over a 32-symbol alphabet give a keyspace of 2^30 codes.
pub const DEFAULT_CODE_LENGTH: usize = 6;

pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

impl<T> CodeGenerator for Arc<T>
where
    T: CodeGenerator + ?Sized,
{
    fn generate(&self) -> String {
        self.as_ref().generate()
    }
}

#[derive(Clone, Debug)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length: length.max(1) }
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..self.length)
            .map(|_| {
                let idx = rng.gen_range(0..CODE_ALPHABET.len());
                CODE_ALPHABET[idx] as char
            })
            .collect()
    }
}
