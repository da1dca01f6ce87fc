//! Atomic File Writer

use std::fs;
use std::io;
use std::path::Path;

/// Writes `bytes` to `path` such that the path always holds either the
/// previous or the new complete content.
///
/// The bytes are written to a `.tmp` sibling in the same directory (staying
/// on the same filesystem keeps the final rename atomic) and then renamed
/// onto `path`. If anything fails before the rename, the temporary file is
/// removed and the original file is left untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = tmp_sibling(path);
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    match fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
