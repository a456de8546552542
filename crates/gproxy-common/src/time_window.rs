use time::OffsetDateTime;

/// Quota admission windows (§4.3). All windows tick on wall-clock UTC
/// boundaries, never on a sliding basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Window {
    Minute,
    Hour,
    Day,
    Month,
}

impl Window {
    pub const ALL: [Window; 4] = [Window::Minute, Window::Hour, Window::Day, Window::Month];

    /// A key stable for the duration of the current window bucket; two calls
    /// within the same bucket return the same key, so counters naturally
    /// reset when the wall-clock boundary is crossed.
    pub fn bucket_key(&self, now: OffsetDateTime) -> i64 {
        match self {
            Window::Minute => now.unix_timestamp() / 60,
            Window::Hour => now.unix_timestamp() / 3600,
            Window::Day => now.unix_timestamp() / 86_400,
            Window::Month => (now.year() as i64) * 12 + now.month() as i64,
        }
    }
}

/// Returns the bucket key for every window at `now`, paired with its window.
pub fn window_boundary(now: OffsetDateTime) -> Vec<(Window, i64)> {
    Window::ALL.iter().map(|w| (*w, w.bucket_key(now))).collect()
}
