//! Debugger command line, built without allocating.
//!
//! Everything reachable from [`CommandTemplate::render()`] runs in the child of a crashed
//! process, so it is restricted to copying bytes between fixed-size arrays. No `fmt`, no
//! heap, no libc helpers.

use std::ffi::CStr;

/// Total size of a command buffer, including the terminating NUL.
pub const COMMAND_CAPACITY: usize = 256;

/// Reserved for `0x` and the 16 hex digits of a 64-bit pid.
pub const PID_FIELD_WIDTH: usize = 2 + 2 * std::mem::size_of::<u64>();

/// Positional argument naming the program. The debugger ignores it and attaches by pid.
const PROGRAM_PLACEHOLDER: &[u8] = b" _dummy_process_name_ ";

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// Prepared command with a blank pid field at its end, e.g.
/// `gdb _dummy_process_name_ ` followed by [`PID_FIELD_WIDTH`] spaces.
///
/// Built once at startup so the crash path only needs a copy and a digit fill.
#[derive(Clone, Copy, Debug)]
pub struct CommandTemplate {
    buf: [u8; COMMAND_CAPACITY],

    /// Length of the command, excluding the NUL.
    len: usize,
}

impl CommandTemplate {
    /// Largest debugger name that fits next to the placeholder and pid field.
    pub const MAX_DEBUGGER_LEN: usize =
        COMMAND_CAPACITY - 1 - PROGRAM_PLACEHOLDER.len() - PID_FIELD_WIDTH;

    /// Template for `debugger`, which may carry its own leading arguments
    /// (`gdb -q`, say). Fails with a reason if it cannot be used.
    pub fn new(debugger: &[u8]) -> Result<Self, &'static str> {
        if debugger.is_empty() {
            return Err("debugger command is empty");
        }

        if debugger.contains(&0) {
            return Err("debugger command contains a NUL byte");
        }

        if debugger.len() > Self::MAX_DEBUGGER_LEN {
            return Err("debugger command is too long");
        }

        let mut buf = [0u8; COMMAND_CAPACITY];
        let mut len = 0;

        for part in [debugger, PROGRAM_PLACEHOLDER] {
            buf[len..len + part.len()].copy_from_slice(part);
            len += part.len();
        }

        for b in &mut buf[len..len + PID_FIELD_WIDTH] {
            *b = b' ';
        }
        len += PID_FIELD_WIDTH;

        Ok(Self { buf, len })
    }

    /// Template text, blank pid field included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Copy the template into a fresh buffer and fill in `pid` as `0x`-prefixed hex.
    ///
    /// Async-signal-safe.
    pub fn render(&self, pid: libc::pid_t) -> AttachCommand {
        let mut buf = self.buf;
        let len = self.len;

        let field = &mut buf[len - PID_FIELD_WIDTH..len];
        let digits = pid as u32 as u64;
        let start = encode_hex(&mut field[2..], digits) + 2;

        field[start - 2] = b'0';
        field[start - 1] = b'x';

        AttachCommand { buf, len }
    }
}

/// A rendered, NUL-terminated debugger command, ready to hand to `exec`.
#[derive(Clone, Copy, Debug)]
pub struct AttachCommand {
    buf: [u8; COMMAND_CAPACITY],
    len: usize,
}

impl AttachCommand {
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_c_str(&self) -> &CStr {
        // The buffer is zero-filled past `len`, and templates reject interior NULs.
        unsafe { CStr::from_bytes_with_nul_unchecked(&self.buf[..=self.len]) }
    }
}

/// Write `value` as lowercase hex into the end of `buf`, least-significant nibble last.
///
/// Returns the index of the first digit written. At least one digit is always written,
/// so zero encodes as `0`. If `buf` is too short the most significant digits are dropped.
/// Async-signal-safe.
pub fn encode_hex(buf: &mut [u8], mut value: u64) -> usize {
    let mut i = buf.len();

    while i > 0 {
        i -= 1;
        buf[i] = HEX_DIGITS[(value & 0xf) as usize];
        value >>= 4;

        if value == 0 {
            break;
        }
    }

    i
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    fn encoded(value: u64) -> String {
        let mut buf = [b' '; 16];
        let start = encode_hex(&mut buf, value);
        String::from_utf8(buf[start..].to_vec()).unwrap()
    }

    #[test]
    fn test_encode_hex() {
        assert_eq!(encoded(0), "0");
        assert_eq!(encoded(0x9), "9");
        assert_eq!(encoded(0xa), "a");
        assert_eq!(encoded(0x1f), "1f");
        assert_eq!(encoded(4194304), "400000");
        assert_eq!(encoded(u64::MAX), "ffffffffffffffff");
    }

    #[test]
    fn test_encode_hex_short_buffer() {
        let mut buf = [b' '; 2];
        let start = encode_hex(&mut buf, 0xabc);
        assert_eq!(start, 0);
        assert_eq!(&buf, b"bc");

        let mut empty: [u8; 0] = [];
        assert_eq!(encode_hex(&mut empty, 0xabc), 0);
    }

    #[test]
    fn test_template() {
        let template = CommandTemplate::new(b"gdb").unwrap();
        let expected = format!("gdb _dummy_process_name_ {}", " ".repeat(PID_FIELD_WIDTH));
        assert_eq!(template.as_bytes(), expected.as_bytes());
    }

    #[test]
    fn test_render() {
        let template = CommandTemplate::new(b"gdb -q").unwrap();
        let command = template.render(0x1234);

        let text = command.as_c_str().to_str().unwrap();
        assert!(text.starts_with("gdb -q _dummy_process_name_ "));
        assert!(text.ends_with(" 0x1234"));
        assert_eq!(text.len(), template.as_bytes().len());

        // Rendering leaves the template blank for the next use.
        assert!(template.as_bytes().ends_with(b"  "));
    }

    #[test]
    fn test_template_rejects() {
        assert!(CommandTemplate::new(b"").is_err());
        assert!(CommandTemplate::new(b"g\0db").is_err());

        let longest = vec![b'g'; CommandTemplate::MAX_DEBUGGER_LEN];
        assert!(CommandTemplate::new(&longest).is_ok());

        let too_long = vec![b'g'; CommandTemplate::MAX_DEBUGGER_LEN + 1];
        assert!(CommandTemplate::new(&too_long).is_err());
    }

    #[test]
    fn test_render_longest_template() {
        let longest = vec![b'g'; CommandTemplate::MAX_DEBUGGER_LEN];
        let template = CommandTemplate::new(&longest).unwrap();
        let command = template.render(libc::pid_t::MAX);

        assert_eq!(command.as_bytes().len(), COMMAND_CAPACITY - 1);
        assert!(command.as_bytes().ends_with(b"0x7fffffff"));
    }

    proptest! {
        #[test]
        fn test_hex_decodes_to_value(value: u64) {
            let mut buf = [0u8; 16];
            let start = encode_hex(&mut buf, value);
            let digits = std::str::from_utf8(&buf[start..]).unwrap();

            prop_assert!(digits.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
            prop_assert_eq!(u64::from_str_radix(digits, 16).unwrap(), value);
        }

        #[test]
        fn test_rendered_pid_decodes(pid in 1..=libc::pid_t::MAX) {
            let template = CommandTemplate::new(b"gdb").unwrap();
            let command = template.render(pid);
            let text = command.as_c_str().to_str().unwrap();

            let hex = text.rsplit(' ').next().unwrap();
            let digits = hex.strip_prefix("0x").unwrap();

            prop_assert_eq!(i64::from_str_radix(digits, 16).unwrap(), pid as i64);
        }
    }
}
