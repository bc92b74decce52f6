//! Mapping file parser
//!
//! Line format: `cobo,asad,aget,channel,pad`. The first two lines of every
//! mapping file are not data and are dropped without looking at them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{HardwareAddress, PadIndex};
use crate::error::{PadMapError, PadMapResult};

/// Number of leading lines discarded regardless of content
const SKIPPED_HEADER_LINES: usize = 2;

/// Fields per data line
const FIELD_COUNT: usize = 5;

/// First-field marker for rows that carry no mapping
const SKIP_MARKER: &str = "-1";

/// Origin reported in I/O errors from `parse_reader`
const READER_ORIGIN: &str = "<reader>";

pub(super) fn parse_file(path: &Path) -> PadMapResult<Vec<(HardwareAddress, PadIndex)>> {
    let file = File::open(path).map_err(|source| PadMapError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    read_records(BufReader::new(file), path)
}

pub(super) fn parse_reader<R: BufRead>(
    reader: R,
) -> PadMapResult<Vec<(HardwareAddress, PadIndex)>> {
    read_records(reader, Path::new(READER_ORIGIN))
}

fn read_records<R: BufRead>(
    reader: R,
    origin: &Path,
) -> PadMapResult<Vec<(HardwareAddress, PadIndex)>> {
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| PadMapError::Io {
            path: origin.to_path_buf(),
            source,
        })?;
        push_line(&mut records, idx, &line)?;
    }
    Ok(records)
}

pub(super) fn parse_lines<I, S>(lines: I) -> PadMapResult<Vec<(HardwareAddress, PadIndex)>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut records = Vec::new();
    for (idx, line) in lines.into_iter().enumerate() {
        push_line(&mut records, idx, line.as_ref())?;
    }
    Ok(records)
}

fn push_line(
    records: &mut Vec<(HardwareAddress, PadIndex)>,
    idx: usize,
    line: &str,
) -> PadMapResult<()> {
    if idx < SKIPPED_HEADER_LINES {
        return Ok(());
    }
    if let Some(record) = parse_record(idx + 1, line)? {
        records.push(record);
    }
    Ok(())
}

/// Parse one data line; `Ok(None)` means the line is a skip line
fn parse_record(line_no: usize, line: &str) -> PadMapResult<Option<(HardwareAddress, PadIndex)>> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let first = fields.first().copied().unwrap_or_default();
    if first.is_empty() || first == SKIP_MARKER {
        return Ok(None);
    }

    let malformed = |reason: String| PadMapError::MalformedRecord {
        line: line_no,
        content: line.to_string(),
        reason,
    };

    if fields.len() != FIELD_COUNT {
        return Err(malformed(format!(
            "expected {} fields, found {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let coord = |pos: usize, name: &str| -> PadMapResult<i32> {
        fields[pos]
            .parse::<i32>()
            .map_err(|e| malformed(format!("invalid {} '{}': {}", name, fields[pos], e)))
    };

    let addr = HardwareAddress::new(
        coord(0, "cobo")?,
        coord(1, "asad")?,
        coord(2, "aget")?,
        coord(3, "channel")?,
    );

    let pad = fields[4]
        .parse::<u16>()
        .map(PadIndex)
        .map_err(|e| malformed(format!("invalid pad '{}': {}", fields[4], e)))?;

    if pad.is_missing() {
        return Err(malformed(format!(
            "pad {} is reserved for missing mappings",
            pad
        )));
    }

    Ok(Some((addr, pad)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn test_skips_first_two_lines_unconditionally() {
        // Valid-looking header lines are still dropped
        let records = parse_lines(["1,1,1,1,1", "2,2,2,2,2", "3,3,3,3,3"]).unwrap();
        assert_eq!(records, vec![(HardwareAddress::new(3, 3, 3, 3), PadIndex(3))]);
    }

    #[test]
    fn test_skip_lines() {
        let records = parse_lines(["h", "h", "", "   ", "-1,0,0,0,0", ",,,,", "0,0,0,1,5"]).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_malformed_line_aborts() {
        let err = parse_lines(["h", "h", "0,0,0,1,5", "0,zero,0,2,6"]).unwrap_err();
        match err {
            PadMapError::MalformedRecord { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_field_count() {
        assert!(parse_lines(["h", "h", "0,0,0,1"]).is_err());
        assert!(parse_lines(["h", "h", "0,0,0,1,2,3"]).is_err());
    }

    #[test]
    fn test_pad_must_fit_and_not_be_sentinel() {
        assert!(parse_lines(["h", "h", "0,0,0,1,70000"]).is_err());
        assert!(parse_lines(["h", "h", "0,0,0,1,20000"]).is_err());
    }

    #[test]
    fn test_crlf_and_spaces() {
        let input = "x\r\ny\r\n 2 , 1 , 0 , 33 , 1200 \r\n";
        let records = parse_reader(Cursor::new(input)).unwrap();
        assert_eq!(records, vec![(HardwareAddress::new(2, 1, 0, 33), PadIndex(1200))]);
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cobo,asad,aget,channel,pad").unwrap();
        writeln!(file, "junk").unwrap();
        writeln!(file, "0,0,0,0,0").unwrap();
        writeln!(file, "0,0,0,1,1").unwrap();
        file.flush().unwrap();

        let records = parse_file(file.path()).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_file_and_reader_agree() {
        let input = "h\nh\n0,0,0,0,7\n-1,0,0,0,0\n\n3,2,1,0,8\n";
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(input.as_bytes()).unwrap();
        file.flush().unwrap();

        let from_file = parse_file(file.path()).unwrap();
        let from_reader = parse_reader(Cursor::new(input)).unwrap();
        assert_eq!(from_file, from_reader);
        assert_eq!(from_file.len(), 2);
    }

    #[test]
    fn test_read_error_names_the_file() {
        // A directory opens on Linux but fails on the first read
        let dir = tempfile::tempdir().unwrap();
        match parse_file(dir.path()).unwrap_err() {
            PadMapError::Io { path, .. } => assert_eq!(path, dir.path()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = parse_file(Path::new("/nonexistent/padmap.csv")).unwrap_err();
        assert!(matches!(err, PadMapError::Io { .. }));
    }
}
