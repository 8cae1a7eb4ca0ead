use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};

use crate::error::{ProcessingError, Result};

/// Decode a raw instrument file into text.
///
/// The charset is guessed from byte statistics (instrument exports are often
/// Windows-1251 or Windows-1252 rather than UTF-8). When the guess cannot
/// decode the buffer cleanly, strict UTF-8 is tried before giving up.
pub fn decode(bytes: &[u8]) -> Result<String> {
    let encoding = guess(bytes);
    let (text, used, had_errors) = encoding.decode(bytes);
    if !had_errors {
        log::debug!("decoded {} bytes as {}", bytes.len(), used.name());
        return Ok(text.into_owned());
    }

    log::debug!("{} could not decode buffer, falling back to UTF-8", encoding.name());
    match UTF_8.decode_without_bom_handling_and_without_replacement(strip_utf8_bom(bytes)) {
        Some(text) => Ok(text.into_owned()),
        None => Err(ProcessingError::decoding(format!(
            "buffer is neither valid {} nor valid UTF-8",
            encoding.name()
        ))),
    }
}

/// Statistical charset guess; UTF-8 wins whenever the bytes are valid UTF-8.
pub fn guess(bytes: &[u8]) -> &'static Encoding {
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    detector.guess(None, true)
}

fn strip_utf8_bom(bytes: &[u8]) -> &[u8] {
    bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_passes_through() {
        assert_eq!(decode(b"100.0,0.01\n").unwrap(), "100.0,0.01\n");
    }

    #[test]
    fn utf8_with_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("nm; %R\n".as_bytes());
        assert_eq!(decode(&bytes).unwrap(), "nm; %R\n");
    }

    #[test]
    fn windows_1251_cyrillic_is_recognised() {
        let line = "//Монохроматор: результаты регистрации\n\
                    //Прибор: МСФУ-К, длина волны, коэффициент отражения\n\
                    //Образец: пигмент, измерение выполнено при комнатной температуре\n";
        let (bytes, _, _) = encoding_rs::WINDOWS_1251.encode(line);
        assert_eq!(decode(&bytes).unwrap(), line);
    }
}
