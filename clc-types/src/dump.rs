//! Hex dump rendering for raw message bytes and decode diagnostics.

/// Formats `buf` in canonical hex+ASCII form, 16 bytes per line:
///
/// ```text
/// 00000000  e2 d4 c3 d9 04 00 1c 10  25 25 25 25 25 25 25 00  |........%%%%%%%.|
/// ```
///
/// Every line, including the last, is newline-terminated.
pub fn hex_dump(buf: &[u8]) -> String {
    let mut out = String::new();
    for (i, chunk) in buf.chunks(16).enumerate() {
        out.push_str(&format!("{:08x} ", i * 16));
        for (j, b) in chunk.iter().enumerate() {
            if j % 8 == 0 {
                out.push(' ');
            }
            out.push_str(&format!("{b:02x} "));
        }
        // pad short final lines so the ASCII column stays aligned
        for j in chunk.len()..16 {
            if j % 8 == 0 {
                out.push(' ');
            }
            out.push_str("   ");
        }
        out.push(' ');
        out.push('|');
        for b in chunk {
            out.push(if (0x20..0x7f).contains(b) {
                *b as char
            } else {
                '.'
            });
        }
        out.push('|');
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_line() {
        let buf = [
            0xE2, 0xD4, 0xC3, 0xD9, 0x04, 0x00, 0x1C, 0x10, 0x25, 0x25, 0x25, 0x25, 0x25, 0x25,
            0x25, 0x00,
        ];
        assert_eq!(
            hex_dump(&buf),
            "00000000  e2 d4 c3 d9 04 00 1c 10  25 25 25 25 25 25 25 00  |........%%%%%%%.|\n"
        );
    }

    #[test]
    fn partial_line_is_padded() {
        let buf = [0x41, 0x42, 0x43];
        assert_eq!(
            hex_dump(&buf),
            "00000000  41 42 43                                          |ABC|\n"
        );
    }

    #[test]
    fn multiple_lines() {
        let buf = [0u8; 17];
        let dump = hex_dump(&buf);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000"));
        assert!(lines[1].starts_with("00000010"));
    }

    #[test]
    fn empty_buffer() {
        assert_eq!(hex_dump(&[]), "");
    }
}
