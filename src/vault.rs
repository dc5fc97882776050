//! Scoped temp file holding the vault password for one run.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

/// A vault password written to a private temp file.
///
/// The file lives for the duration of one run; dropping the value removes
/// it. `close` exists so the normal end-of-run path can surface a deletion
/// failure instead of swallowing it.
pub struct VaultSecret {
    file: NamedTempFile,
}

impl VaultSecret {
    pub fn create(password: &str) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("playrack-vault-")
            .tempfile()
            .map_err(|err| Error::SecretFile(err.to_string()))?;
        // NamedTempFile is created 0600 on unix.
        writeln!(file, "{}", password).map_err(|err| Error::SecretFile(err.to_string()))?;
        file.flush()
            .map_err(|err| Error::SecretFile(err.to_string()))?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Deletes the file, reporting failure to the caller.
    pub fn close(self) -> Result<()> {
        self.file
            .close()
            .map_err(|err| Error::SecretFile(err.to_string()))
    }
}
