use std::fs;
use std::path::Path;

use miette::{IntoDiagnostic, Result, WrapErr};

use crate::error;
use crate::runtime::MEMORY_MAX;

/// A decoded program image: a load origin plus the words to place there.
///
/// The on-disk format is a sequence of big-endian 16-bit words, the first of
/// which is the origin. Decoding converts every word to host byte order, so
/// the runtime only ever sees native values.
pub struct Image {
    orig: u16,
    words: Vec<u16>,
}

impl Image {
    /// Read and decode an image file.
    pub fn open(path: &Path) -> Result<Image> {
        let bytes = fs::read(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to read image file `{}`", path.display()))?;
        Image::decode(&bytes, path)
    }

    pub fn decode(bytes: &[u8], path: &Path) -> Result<Image> {
        if bytes.len() % 2 != 0 {
            return Err(error::load_unaligned(path));
        }
        if bytes.len() < 2 {
            return Err(error::load_no_origin(path));
        }

        let orig = u16::from_be_bytes([bytes[0], bytes[1]]);
        let words: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|word| u16::from_be_bytes([word[0], word[1]]))
            .collect();

        if usize::from(orig) + words.len() > MEMORY_MAX {
            return Err(error::load_overflow(path, orig, words.len()));
        }

        Ok(Image { orig, words })
    }

    pub fn orig(&self) -> u16 {
        self.orig
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }
}
