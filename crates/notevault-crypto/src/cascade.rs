use std::fmt;

use crate::error::Result;
use crate::processor::CipherProcessor;

/// An ordered chain of processors: encryption runs front to back and
/// decryption back to front. An empty cascade is the identity.
pub struct CascadeCipher {
    processors: Vec<Box<dyn CipherProcessor>>,
}

impl CascadeCipher {
    pub fn new(processors: Vec<Box<dyn CipherProcessor>>) -> Self {
        Self { processors }
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl CipherProcessor for CascadeCipher {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        for processor in &self.processors {
            buf = processor.encrypt(&buf)?;
        }
        Ok(buf)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut buf = data.to_vec();
        for processor in self.processors.iter().rev() {
            buf = processor.decrypt(&buf)?;
        }
        Ok(buf)
    }
}

impl fmt::Debug for CascadeCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CascadeCipher")
            .field("stages", &self.processors.len())
            .finish()
    }
}
