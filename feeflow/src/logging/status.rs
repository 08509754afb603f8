//! Structured status lines.

use crate::core::{RunRecord, SkippedTick};
use serde::{Deserialize, Serialize};
use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// One line of a job's status file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusLine {
    /// A finished run.
    Run(RunRecord),
    /// A dropped tick.
    Skip(SkippedTick),
}

impl StatusLine {
    /// Renders the line without its trailing newline.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Bytes read per backward step when looking for the last line.
const TAIL_CHUNK: usize = 8 * 1024;

/// Reads the most recent entry of a status file.
///
/// Only the tail of the file is read. A missing file yields `Ok(None)`.
pub async fn read_last_status(path: &Path) -> io::Result<Option<StatusLine>> {
    let Some(last) = last_line(path, TAIL_CHUNK).await? else {
        return Ok(None);
    };

    serde_json::from_slice(&last)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Last non-blank line of `path`, found by reading `chunk`-sized blocks
/// backwards from the end.
async fn last_line(path: &Path, chunk: usize) -> io::Result<Option<Vec<u8>>> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let chunk = chunk.max(1);
    let mut pos = file.metadata().await?.len();
    let mut tail: Vec<u8> = Vec::new();

    loop {
        let end = tail
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        if let Some(newline) = tail[..end].iter().rposition(|&b| b == b'\n') {
            return Ok(Some(tail[newline + 1..end].to_vec()));
        }
        if pos == 0 {
            return Ok((end > 0).then(|| tail[..end].to_vec()));
        }

        let step = chunk.min(usize::try_from(pos).unwrap_or(usize::MAX));
        pos -= step as u64;
        file.seek(SeekFrom::Start(pos)).await?;

        let mut block = vec![0; step];
        file.read_exact(&mut block).await?;
        block.extend_from_slice(&tail);
        tail = block;
    }
}
