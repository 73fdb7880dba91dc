//! Splits the inbound byte stream into text lines.

use memchr::memchr2;

/// A line that never terminates is emitted once it reaches this size.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// Accepts `\r\n`, `\n` or a bare `\r` as terminators, including a `\r\n`
/// pair split across two chunks. Decoding is lossy UTF-8 per complete line,
/// so multi-byte characters may straddle chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct LineAssembler {
    pending: Vec<u8>,
    after_cr: bool,
}

impl LineAssembler {
    pub(crate) fn push(&mut self, mut chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        if self.after_cr && !chunk.is_empty() {
            self.after_cr = false;
            if chunk[0] == b'\n' {
                chunk = &chunk[1..];
            }
        }

        while let Some(pos) = memchr2(b'\r', b'\n', chunk) {
            self.pending.extend_from_slice(&chunk[..pos]);
            lines.push(self.take_line());

            let terminator = chunk[pos];
            chunk = &chunk[pos + 1..];
            if terminator == b'\r' {
                match chunk.first() {
                    Some(b'\n') => chunk = &chunk[1..],
                    Some(_) => {}
                    None => self.after_cr = true,
                }
            }
        }

        self.pending.extend_from_slice(chunk);
        if self.pending.len() >= MAX_PENDING_LINE {
            lines.push(self.take_line());
        }
        lines
    }

    /// The unterminated remainder, if any.
    pub(crate) fn flush(&mut self) -> Option<String> {
        self.after_cr = false;
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_line())
        }
    }

    fn take_line(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_all_terminators() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"a\r\nb\nc\rd"), vec!["a", "b", "c"]);
        assert_eq!(lines.flush(), Some("d".to_string()));
        assert_eq!(lines.flush(), None);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"OK\r"), vec!["OK"]);
        assert_eq!(lines.push(b"\nREADY\r\n"), vec!["READY"]);
    }

    #[test]
    fn test_partial_lines_are_joined() {
        let mut lines = LineAssembler::default();
        assert!(lines.push(b"PI").is_empty());
        assert_eq!(lines.push(b"NG\r\n"), vec!["PING"]);
    }

    #[test]
    fn test_blank_lines_are_kept() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"\r\n\r\n"), vec!["", ""]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let mut lines = LineAssembler::default();
        let text = "température\n".as_bytes();
        let (head, tail) = text.split_at(5);
        assert!(lines.push(head).is_empty());
        assert_eq!(lines.push(tail), vec!["température"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut lines = LineAssembler::default();
        assert_eq!(lines.push(b"\xffA\n"), vec!["\u{fffd}A"]);
    }

    #[test]
    fn test_runaway_line_is_emitted() {
        let mut lines = LineAssembler::default();
        let out = lines.push(&vec![b'x'; MAX_PENDING_LINE]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), MAX_PENDING_LINE);
    }
}
