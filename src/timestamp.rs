/// Formats 90 kHz ticks as `hh:mm:ss.mmm`.
pub fn ticks_str(ticks: u64) -> String {
    let ms = ticks / 90;
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let milliseconds = ms % 1000;

    format!(
        "{hours:0width$}:{minutes:02}:{seconds:02}.{milliseconds:03}",
        width = if hours >= 100 { 0 } else { 2 }
    )
}

#[test]
fn formats_ticks() {
    assert_eq!(ticks_str(0), "00:00:00.000");
    assert_eq!(ticks_str(90_000 * 3_725 + 45), "01:02:05.000");
    assert_eq!(ticks_str(90 * 1_500), "00:00:01.500");
}
