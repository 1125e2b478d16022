//! `Accept` header handling.

#[derive(Debug, Clone, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    quality: f32,
}

impl MediaRange {
    fn matches(&self, mime: &str) -> bool {
        let (kind, subtype) = mime.split_once('/').unwrap_or((mime, ""));
        (self.kind == "*" || self.kind.eq_ignore_ascii_case(kind))
            && (self.subtype == "*" || self.subtype.eq_ignore_ascii_case(subtype))
    }

    fn specificity(&self) -> u8 {
        (self.kind != "*") as u8 + (self.subtype != "*") as u8
    }
}

/// A parsed `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct Accept {
    ranges: Vec<MediaRange>,
}

impl Accept {
    /// A missing header accepts anything.
    pub fn parse(header: Option<&str>) -> Self {
        let header = header.map(str::trim).filter(|h| !h.is_empty()).unwrap_or("*/*");
        let ranges = header
            .split(',')
            .filter_map(|item| {
                let mut parts = item.split(';');
                let (kind, subtype) = parts.next()?.trim().split_once('/')?;
                let quality = parts
                    .filter_map(|param| param.trim().strip_prefix("q="))
                    .find_map(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);
                Some(MediaRange {
                    kind: kind.trim().to_string(),
                    subtype: subtype.trim().to_string(),
                    quality,
                })
            })
            .collect();
        Self { ranges }
    }

    /// Quality the client gives `mime`: the most specific matching range
    /// wins, 0 when nothing matches.
    pub fn quality(&self, mime: &str) -> f32 {
        self.ranges
            .iter()
            .filter(|range| range.matches(mime))
            .max_by(|a, b| {
                a.specificity()
                    .cmp(&b.specificity())
                    .then(a.quality.total_cmp(&b.quality))
            })
            .map(|range| range.quality)
            .unwrap_or(0.0)
    }

    /// Highest-quality candidate; earlier candidates win ties.
    pub fn best_match<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        let mut best: Option<(&'a str, f32)> = None;
        for &candidate in candidates {
            let quality = self.quality(candidate);
            if quality > 0.0 && best.map(|(_, q)| quality > q).unwrap_or(true) {
                best = Some((candidate, quality));
            }
        }
        best.map(|(mime, _)| mime)
    }
}

/// JSON only when it is strictly preferred over HTML, so plain browsers
/// sending `*/*` get markup.
pub fn request_wants_json(accept: Option<&str>) -> bool {
    let accept = Accept::parse(accept);
    accept.best_match(&["application/json", "text/html"]) == Some("application/json")
        && accept.quality("application/json") > accept.quality("text/html")
}
