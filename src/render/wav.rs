// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! WAVE export.
//!
//! Writes the classic 44-byte RIFF/WAVE header followed by interleaved
//! 16-bit little-endian stereo PCM. Samples are clamped to [-1, 1] before
//! quantization.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::info;

use super::RenderedAudio;

const BYTES_PER_FRAME: u32 = 4;

/// Writes `audio` as a RIFF/WAVE stream.
pub fn write_wav<W: Write>(writer: &mut W, audio: &RenderedAudio) -> io::Result<()> {
    let data_size = audio.len() as u32 * BYTES_PER_FRAME;

    writer.write_all(b"RIFF")?;
    writer.write_all(&(data_size + 36).to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&16u32.to_le_bytes())?;
    // PCM, stereo.
    writer.write_all(&1u16.to_le_bytes())?;
    writer.write_all(&2u16.to_le_bytes())?;
    writer.write_all(&audio.sample_rate.to_le_bytes())?;
    writer.write_all(&(audio.sample_rate * BYTES_PER_FRAME).to_le_bytes())?;
    writer.write_all(&(BYTES_PER_FRAME as u16).to_le_bytes())?;
    writer.write_all(&16u16.to_le_bytes())?;

    writer.write_all(b"data")?;
    writer.write_all(&data_size.to_le_bytes())?;

    let mut pcm = Vec::with_capacity(data_size as usize);
    for (&l, &r) in audio.left.iter().zip(&audio.right) {
        for sample in [l, r] {
            let quantized = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            pcm.extend_from_slice(&quantized.to_le_bytes());
        }
    }
    writer.write_all(&pcm)
}

/// Writes `audio` to a WAVE file at `path`.
pub fn write_wav_file<P: AsRef<Path>>(path: P, audio: &RenderedAudio) -> io::Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_wav(&mut writer, audio)?;
    writer.flush()?;
    info!(path = %path.display(), frames = audio.len(), "wrote wav file");
    Ok(())
}
