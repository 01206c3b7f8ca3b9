// src/output.rs
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Writes one JSON object per line to `path`, or to stdout when `path` is
/// `None`. Returns the number of lines written.
pub fn write_json_lines<T, I>(path: Option<&Path>, rows: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file {}", path.display()))?;
            write_lines(BufWriter::new(file), rows)
                .with_context(|| format!("Failed to write {}", path.display()))
        }
        None => write_lines(BufWriter::new(io::stdout().lock()), rows),
    }
}

fn write_lines<W: Write, T: Serialize, I: IntoIterator<Item = T>>(mut writer: W, rows: I) -> Result<usize> {
    let mut count = 0;
    for row in rows {
        serde_json::to_writer(&mut writer, &row)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}
