//! Control sequence removal for captured output lines

const ESC: u8 = 0x1b;

/// Remove terminal control sequences from a raw line.
///
/// Strips clear screen (`ESC c`), backspace and carriage return. Removing a
/// backspace or carriage return can bring an `ESC` next to a `c`; that pair is
/// removed as well, so the result never contains any of the three.
pub fn sanitize_line(line: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(line.len());

    for &byte in line {
        match byte {
            b'\x08' | b'\r' => {}
            b'c' if out.last() == Some(&ESC) => {
                out.pop();
            }
            _ => out.push(byte),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL_SEQUENCES: [&[u8]; 3] = [b"\x1bc", b"\x08", b"\r"];

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn test_clean_line_unchanged() {
        assert_eq!(sanitize_line(b"hello world"), b"hello world");
    }

    #[test]
    fn test_removes_each_sequence() {
        assert_eq!(sanitize_line(b"\x1bcready"), b"ready");
        assert_eq!(sanitize_line(b"ab\x08c"), b"abc");
        assert_eq!(sanitize_line(b"done\r"), b"done");
    }

    #[test]
    fn test_removes_mixed_sequences() {
        let line = b"\r\x1bc50%\x08\x08\x08100%\r\x1bc";
        assert_eq!(sanitize_line(line), b"50%100%");
    }

    #[test]
    fn test_only_control_sequences_becomes_empty() {
        assert!(sanitize_line(b"\r\r\x08\x1bc").is_empty());
    }

    #[test]
    fn test_other_escapes_are_kept() {
        // ANSI colors are not part of the removed set
        let colored = b"\x1b[31mred\x1b[0m";
        assert_eq!(sanitize_line(colored), colored);
        // a lone ESC not followed by 'c' survives too
        assert_eq!(sanitize_line(b"\x1bx"), b"\x1bx");
    }

    #[test]
    fn test_clear_screen_rebuilt_by_removal_is_stripped() {
        assert!(sanitize_line(b"\x1b\rc").is_empty());
        assert!(sanitize_line(b"\x1b\x08c").is_empty());
        assert!(sanitize_line(b"\x1b\x1bcc").is_empty());
        assert_eq!(sanitize_line(b"a\x1b\r\x08cb"), b"ab");
    }

    #[test]
    fn test_output_never_contains_control_sequences() {
        // every line up to six bytes over an alphabet that can form the sequences
        let alphabet = [ESC, b'c', b'\r', b'\x08', b'x'];
        let mut lines: Vec<Vec<u8>> = vec![Vec::new()];
        let mut frontier = lines.clone();
        for _ in 0..6 {
            frontier = frontier
                .iter()
                .flat_map(|line| {
                    alphabet.iter().map(move |&b| {
                        let mut next = line.clone();
                        next.push(b);
                        next
                    })
                })
                .collect();
            lines.extend(frontier.iter().cloned());
        }

        for line in &lines {
            let out = sanitize_line(line);
            for seq in CONTROL_SEQUENCES {
                assert!(!contains(&out, seq), "{:?} -> {:?}", line, out);
            }
        }
    }

    #[test]
    fn test_idempotent() {
        let inputs: [&[u8]; 7] = [
            b"plain",
            b"\x1bc\x1bcc",
            b"a\r\nb",
            b"x\x08y",
            b"\x1b\rc",
            b"\x1b\x08c",
            b"\x1b\x1bcc",
        ];
        for input in inputs {
            let once = sanitize_line(input);
            assert_eq!(sanitize_line(&once), once);
        }
    }
}
