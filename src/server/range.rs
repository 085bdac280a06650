//! Single byte-range requests

/// How to answer a `Range` header for a body of known length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range; send everything with 200
    Full,
    /// Inclusive byte span; send it with 206
    Partial { start: u64, end: u64 },
    /// Range lies outside the body; answer 416
    Unsatisfiable,
}

impl ByteRange {
    /// Interpret a `Range` header value
    ///
    /// Only a single `bytes=` range is honored. Malformed headers and
    /// multi-range requests are ignored, which means a full response.
    pub fn parse(header: Option<&str>, len: u64) -> Self {
        let Some(spec) = header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
            return Self::Full;
        };
        if spec.contains(',') {
            return Self::Full;
        }
        let Some((first, last)) = spec.split_once('-') else {
            return Self::Full;
        };
        let (first, last) = (first.trim(), last.trim());

        // suffix form: last N bytes
        if first.is_empty() {
            return match last.parse::<u64>() {
                Ok(0) => Self::Unsatisfiable,
                Ok(_) if len == 0 => Self::Unsatisfiable,
                Ok(n) => Self::Partial {
                    start: len.saturating_sub(n),
                    end: len - 1,
                },
                Err(_) => Self::Full,
            };
        }

        let Ok(start) = first.parse::<u64>() else {
            return Self::Full;
        };
        let end = if last.is_empty() {
            None
        } else {
            match last.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return Self::Full,
            }
        };

        if start >= len {
            return Self::Unsatisfiable;
        }
        Self::Partial {
            start,
            end: end.map_or(len - 1, |e| e.min(len - 1)),
        }
    }

    /// Number of bytes the response body carries
    pub fn body_len(&self, len: u64) -> u64 {
        match self {
            Self::Full => len,
            Self::Partial { start, end } => end - start + 1,
            Self::Unsatisfiable => 0,
        }
    }

    /// `Content-Range` value for this range
    pub fn content_range(&self, len: u64) -> Option<String> {
        match self {
            Self::Full => None,
            Self::Partial { start, end } => Some(format!("bytes {start}-{end}/{len}")),
            Self::Unsatisfiable => Some(format!("bytes */{len}")),
        }
    }
}
