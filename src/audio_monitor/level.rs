//! PCM level math for the audio monitor.

/// Decode little-endian 16-bit PCM. A trailing odd byte is ignored.
pub fn decode_pcm_i16le(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Mean signal level in dB: `20 * log10(rms)`.
///
/// Returns `None` when the input is empty or the RMS is not a positive
/// finite number (all-zero capture, overflow). Callers skip the sample;
/// `None` here is never an error.
pub fn signal_db(samples: &[i16]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }

    let sum_squares: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64;
            v * v
        })
        .sum();
    let mean_square = sum_squares / samples.len() as f64;
    if !mean_square.is_finite() || mean_square < 0.0 {
        return None;
    }

    let rms = mean_square.sqrt();
    if !rms.is_finite() || rms <= 0.0 {
        return None;
    }

    Some(20.0 * rms.log10())
}

// ============================================================
// Tests
// ============================================================
