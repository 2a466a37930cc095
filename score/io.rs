// ========================================================================================
//
//                          Reference table source handling
//
// ========================================================================================
//
// Both reference tables are plain delimited text, optionally gzip-compressed. This
// module decides how a path is opened and which delimiter the `csv` reader should
// use, so the two loaders share one set of rules.

use csv::{ReaderBuilder, Trim};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Opens a table file, transparently decompressing `.gz` inputs.
pub fn open_table(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read + Send> = if path.extension().is_some_and(|ext| ext == "gz") {
        Box::new(MultiGzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(reader)
}

/// Tab for `.tsv`/`.txt` (with or without a trailing `.gz`), comma otherwise.
pub fn delimiter_for(path: &Path) -> u8 {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    if name.ends_with(".tsv") || name.ends_with(".txt") {
        b'\t'
    } else {
        b','
    }
}

pub fn table_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader)
}

/// Finds the first header whose normalized form matches one of `names`.
pub fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let normalized = header.trim().to_ascii_lowercase();
        names.iter().any(|name| normalized == *name)
    })
}
