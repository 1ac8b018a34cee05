//! Consumers of completed products.
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::product::{Fragment, ProductContainer};

/// Handles products completed by a [Pipeline](crate::pipeline::Pipeline).
///
/// Errors are logged by the pipeline and do not stop it.
pub trait ProductHandler: Send + 'static {
    /// # Errors
    /// Any error handling the product.
    fn handle(&mut self, product: ProductContainer) -> Result<()>;
}

impl<F> ProductHandler for F
where
    F: FnMut(ProductContainer) -> Result<()> + Send + 'static,
{
    fn handle(&mut self, product: ProductContainer) -> Result<()> {
        self(product)
    }
}

/// Inflate a single zlib compressed fragment.
///
/// # Errors
/// [Error::Inflate] if the data is not a complete zlib stream, including streams
/// requiring a preset dictionary.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut output = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut output)
        .map_err(|err| Error::Inflate(err.to_string()))?;
    Ok(output)
}

/// Product bytes rebuilt from its fragments.
#[derive(Debug, Clone, Default)]
pub struct Reconstructed {
    pub data: Vec<u8>,
    /// Compressed fragments skipped because they could not be inflated or inflated
    /// to nothing.
    pub skipped: usize,
}

/// Concatenate the fragments of `product` in order, inflating compressed fragments
/// when `decompress` is set.
///
/// Compressed fragments are inflated in parallel. A fragment that fails to inflate
/// is skipped; the rest of the product is still produced.
#[must_use]
pub fn reconstruct(product: &ProductContainer, decompress: bool) -> Reconstructed {
    let parts: Vec<Option<Vec<u8>>> = product
        .fragments()
        .par_iter()
        .map(|fragment| fragment_bytes(product.sequence(), fragment, decompress))
        .collect();

    let mut zult = Reconstructed::default();
    for part in parts {
        match part {
            Some(data) => zult.data.extend_from_slice(&data),
            None => zult.skipped += 1,
        }
    }
    zult
}

fn fragment_bytes(sequence: u32, fragment: &Fragment, decompress: bool) -> Option<Vec<u8>> {
    if !(decompress && fragment.compressed) {
        return Some(fragment.data.clone());
    }
    match inflate(&fragment.data) {
        Ok(data) if data.is_empty() => {
            warn!(
                sequence,
                fragment = fragment.index,
                len = fragment.data.len(),
                "fragment inflated to nothing"
            );
            None
        }
        Ok(data) => {
            debug!(
                sequence,
                fragment = fragment.index,
                input = fragment.data.len(),
                output = data.len(),
                "inflated"
            );
            Some(data)
        }
        Err(err) => {
            warn!(sequence, fragment = fragment.index, "skipping fragment: {err}");
            None
        }
    }
}

/// Writes each product to its own numbered file in a directory.
#[derive(Debug)]
pub struct FileWriter {
    directory: PathBuf,
    decompress: bool,
    counter: u64,
}

impl FileWriter {
    /// Create a writer for `directory`, creating it if necessary. Decompression is
    /// enabled by default.
    ///
    /// # Errors
    /// If the directory cannot be created.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        fs::create_dir_all(directory.as_ref())?;
        Ok(FileWriter {
            directory: directory.as_ref().to_path_buf(),
            decompress: true,
            counter: 0,
        })
    }

    #[must_use]
    pub fn with_decompression(mut self, enabled: bool) -> Self {
        self.decompress = enabled;
        self
    }

    /// Number of products written.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.counter
    }

    fn path(&self, counter: u64) -> PathBuf {
        self.directory.join(format!("noaaport_{counter}.bin"))
    }
}

impl ProductHandler for FileWriter {
    fn handle(&mut self, product: ProductContainer) -> Result<()> {
        let path = self.path(self.counter);
        self.counter += 1;

        if product.is_compressed() {
            info!(path = %path.display(), name = product.name(), "compressed product");
        }
        let zult = reconstruct(&product, self.decompress);
        fs::write(&path, &zult.data)?;
        debug!(
            path = %path.display(),
            bytes = zult.data.len(),
            skipped = zult.skipped,
            "wrote {product}"
        );
        Ok(())
    }
}
