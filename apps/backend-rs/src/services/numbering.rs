use crate::{
    error::{EngineError, EngineResult},
    models::{NumberingSeries, SeriesKind},
};

/// Hands out document numbers for one series during a single engine call.
///
/// The scan over already-issued numbers happens once in [`SeriesAllocator::new`];
/// every [`SeriesAllocator::next_number`] after that continues from the larger
/// of the stored counter and the scanned maximum, so numbers imported out of
/// band are never reissued. Callers persist [`SeriesAllocator::series`] only
/// together with the documents that consumed the numbers.
#[derive(Debug, Clone)]
pub struct SeriesAllocator {
    series: NumberingSeries,
    scan_next: u64,
}

impl SeriesAllocator {
    pub fn new<'a, I>(
        kind: SeriesKind,
        series: Option<&NumberingSeries>,
        existing: I,
    ) -> EngineResult<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let series = series
            .filter(|item| item.kind == kind)
            .cloned()
            .ok_or_else(|| not_configured(kind))?;
        let scan_next = scan_next_number(&series.prefix, existing).ok_or_else(|| exhausted(kind))?;
        Ok(Self {
            series,
            scan_next,
        })
    }

    pub fn next_number(&mut self) -> EngineResult<String> {
        let candidate = self.series.next_number.max(self.scan_next).max(1);
        let following = candidate
            .checked_add(1)
            .ok_or_else(|| exhausted(self.series.kind))?;
        self.series.next_number = following;
        self.scan_next = following;
        Ok(format_number(
            &self.series.prefix,
            self.series.padding,
            candidate,
        ))
    }

    /// Series with the counter advanced past every number handed out so far.
    pub fn series(&self) -> &NumberingSeries {
        &self.series
    }
}

/// One-shot allocation: the number plus the series to persist with it.
pub fn allocate<'a, I>(
    kind: SeriesKind,
    series: Option<&NumberingSeries>,
    existing: I,
) -> EngineResult<(String, NumberingSeries)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut allocator = SeriesAllocator::new(kind, series, existing)?;
    let number = allocator.next_number()?;
    Ok((number, allocator.series))
}

pub fn format_number(prefix: &str, padding: usize, value: u64) -> String {
    format!("{prefix}{value:0>padding$}")
}

/// Largest numeric suffix among `existing` numbers carrying `prefix`, plus one.
/// `None` when that suffix is already `u64::MAX`.
fn scan_next_number<'a, I>(prefix: &str, existing: I) -> Option<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    match existing
        .into_iter()
        .filter_map(|number| parse_suffix(prefix, number))
        .max()
    {
        Some(value) => value.checked_add(1),
        None => Some(0),
    }
}

fn parse_suffix(prefix: &str, number: &str) -> Option<u64> {
    let suffix = number.trim().strip_prefix(prefix)?;
    if suffix.is_empty() || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    suffix.parse::<u64>().ok()
}

fn not_configured(kind: SeriesKind) -> EngineError {
    EngineError::Configuration(format!(
        "Numbering series for {} documents is not configured. Set a prefix and padding before issuing numbers.",
        kind.label()
    ))
}

fn exhausted(kind: SeriesKind) -> EngineError {
    EngineError::Configuration(format!(
        "Numbering series for {} documents is exhausted. Configure a new prefix or a lower counter.",
        kind.label()
    ))
}
