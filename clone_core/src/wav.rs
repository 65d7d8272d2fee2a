use std::path::Path;

use anyhow::Context;

/// Read the WAV header at `path` and return the clip length in milliseconds.
///
/// Used to confirm that the model left a playable file behind.
pub fn read_duration_ms(path: &Path) -> anyhow::Result<u64> {
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("{} is not a readable WAV file", path.display()))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        anyhow::bail!("{} has an empty WAV format header", path.display());
    }
    // `duration` counts frames (samples per channel)
    let frames = reader.duration() as u64;
    Ok(frames * 1000 / spec.sample_rate as u64)
}
