use std::time::Duration;

/// Formats a duration as `HH:MM:SS.d`, the race clock format.
///
/// Fields are zero-padded, hours wrap at 24, and the trailing digit is
/// hundreds of milliseconds truncated (not rounded).
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    let tenths = (ms % 1000) / 100;
    let seconds = (ms / 1000) % 60;
    let minutes = (ms / (1000 * 60)) % 60;
    let hours = (ms / (1000 * 60 * 60)) % 24;

    format!("{:02}:{:02}:{:02}.{}", hours, minutes, seconds, tenths)
}

/// Inverse of [`format_duration`]. Returns `None` for anything that isn't
/// a well-formed `HH:MM:SS.d` string.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let (clock, tenths) = s.split_once('.')?;
    let mut fields = clock.split(':');

    let hours: u64 = fields.next()?.parse().ok()?;
    let minutes: u64 = fields.next()?.parse().ok()?;
    let seconds: u64 = fields.next()?.parse().ok()?;
    if fields.next().is_some() {
        return None;
    }

    let tenths: u64 = tenths.parse().ok()?;
    if tenths > 9 || minutes > 59 || seconds > 59 {
        return None;
    }

    let ms = hours * 60 * 60 * 1000 + minutes * 60 * 1000 + seconds * 1000 + tenths * 100;
    Some(Duration::from_millis(ms))
}
