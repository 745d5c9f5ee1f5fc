//! Out-of-core median frame combination.
//!
//! Holding N full-resolution frames in memory is often infeasible, so the
//! stacker keeps only one row-band of all N frames in memory at a time. On
//! the first frame the row range is partitioned into contiguous bands sized
//! so that `band_rows × row_bytes × expected_frames` stays within the byte
//! budget, one spill file per band. Every added frame appends its rows to
//! each band file, making a band file N row-major sub-images concatenated
//! along the frame axis. The combine pass maps one band at a time and writes
//! per-pixel, per-channel medians into the output.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;
use rayon::prelude::*;

use crate::astro_image::{AstroImage, ImageDimensions};
use crate::common::cancel::CancelToken;
use crate::math;

use super::error::Error;

/// Distinguishes spill directories of stackers living in the same process.
static STACKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Metadata for one temporary spill file: a contiguous row band, rows
/// inclusive on both ends.
#[derive(Debug, Clone)]
pub struct PartFile {
    pub path: PathBuf,
    pub start_row: usize,
    pub end_row: usize,
}

impl PartFile {
    /// Number of rows in this band.
    pub fn rows(&self) -> usize {
        self.end_row - self.start_row + 1
    }
}

/// Accumulates equally-sized frames and produces their per-pixel median
/// using bounded memory via temporary spill files.
///
/// All added frames must share width, height and channel layout.
#[derive(Debug)]
pub struct FrameStacker {
    temp_dir: PathBuf,
    spill_dir: PathBuf,
    max_spill_bytes: u64,
    expected_frames: usize,
    parts: Vec<PartFile>,
    dimensions: Option<ImageDimensions>,
    frames_added: usize,
    cancel: CancelToken,
}

impl FrameStacker {
    /// Set up a stacker.
    ///
    /// `expected_frames` sizes the row bands; adding more frames than
    /// expected still works but overshoots the byte budget proportionally.
    pub fn new(expected_frames: usize, temp_dir: impl AsRef<Path>, max_spill_bytes: u64) -> Self {
        let temp_dir = temp_dir.as_ref().to_path_buf();
        let seq = STACKER_SEQ.fetch_add(1, Ordering::Relaxed);
        let spill_dir = temp_dir.join(format!("astrarium_stack_{}_{}", std::process::id(), seq));

        Self {
            temp_dir,
            spill_dir,
            max_spill_bytes,
            expected_frames: expected_frames.max(1),
            parts: Vec::new(),
            dimensions: None,
            frames_added: 0,
            cancel: CancelToken::new(),
        }
    }

    /// Number of frames added so far.
    pub fn frame_count(&self) -> usize {
        self.frames_added
    }

    /// The current row-band spill files (empty before the first frame).
    pub fn parts(&self) -> &[PartFile] {
        &self.parts
    }

    /// Token cancelling an in-flight [`process`](Self::process) from another
    /// thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Append one frame's rows, band by band, to the spill files.
    ///
    /// The first call partitions the row range and creates the files. On any
    /// I/O failure partial spill state is deleted before returning.
    pub fn add_frame(&mut self, frame: &AstroImage) -> Result<(), Error> {
        let dims = frame.dimensions();
        match self.dimensions {
            None => {
                if let Err(e) = self.create_parts(dims) {
                    self.clear();
                    return Err(e);
                }
                self.dimensions = Some(dims);
            }
            Some(expected) if expected != dims => {
                return Err(Error::DimensionMismatch {
                    index: self.frames_added,
                    expected,
                    actual: dims,
                });
            }
            Some(_) => {}
        }

        let row_len = dims.row_len();
        for part_index in 0..self.parts.len() {
            let (path, start, end) = {
                let part = &self.parts[part_index];
                (part.path.clone(), part.start_row, part.end_row)
            };

            let rows = &frame.pixels()[start * row_len..(end + 1) * row_len];
            let result = OpenOptions::new()
                .append(true)
                .open(&path)
                .map_err(|e| Error::OpenSpillFile {
                    path: path.clone(),
                    source: e,
                })
                .and_then(|mut file| {
                    file.write_all(bytemuck::cast_slice(rows))
                        .map_err(|e| Error::WriteSpillFile {
                            path: path.clone(),
                            source: e,
                        })
                });

            if let Err(e) = result {
                self.clear();
                return Err(e);
            }
        }

        self.frames_added += 1;
        Ok(())
    }

    /// Combine the added frames into their per-pixel median.
    ///
    /// Per pixel and channel, zero-valued samples (no data, e.g. outside a
    /// frame after warping) are excluded; all-zero positions stay zero.
    /// Returns `Ok(None)` when cancelled; spill files are removed either way
    /// and no partial output escapes.
    pub fn process(&mut self) -> Result<Option<AstroImage>, Error> {
        let Some(dims) = self.dimensions else {
            return Err(Error::NoFrames);
        };
        if self.frames_added == 0 {
            return Err(Error::NoFrames);
        }

        let row_len = dims.row_len();
        let frames = self.frames_added;
        let cancel = self.cancel.clone();
        let mut out = vec![0.0f32; dims.pixel_count()];

        for part_index in 0..self.parts.len() {
            let (path, start, rows) = {
                let part = &self.parts[part_index];
                (part.path.clone(), part.start_row, part.rows())
            };
            let band_values = rows * row_len;

            let file = File::open(&path).map_err(|e| Error::OpenSpillFile {
                path: path.clone(),
                source: e,
            })?;
            let mmap = unsafe {
                Mmap::map(&file).map_err(|e| Error::MapSpillFile {
                    path: path.clone(),
                    source: e,
                })?
            };
            let data: &[f32] = bytemuck::cast_slice(&mmap[..]);
            if data.len() < band_values * frames {
                let err = Error::SpillFileTruncated {
                    path,
                    expected: band_values * frames,
                    actual: data.len(),
                };
                self.clear();
                return Err(err);
            }

            let out_band = &mut out[start * row_len..start * row_len + band_values];
            out_band
                .par_chunks_mut(row_len)
                .enumerate()
                .for_each(|(row, out_row)| {
                    // Cooperative cancellation at row granularity
                    if cancel.is_cancelled() {
                        return;
                    }
                    let mut values = vec![0.0f32; frames];
                    let row_offset = row * row_len;
                    for (px, out_value) in out_row.iter_mut().enumerate() {
                        for (f, value) in values.iter_mut().enumerate() {
                            *value = data[f * band_values + row_offset + px];
                        }
                        *out_value = median_excluding_zeros(&mut values);
                    }
                });

            if cancel.is_cancelled() {
                tracing::info!("stacking cancelled, discarding partial result");
                self.clear();
                return Ok(None);
            }
        }

        self.clear();
        Ok(Some(AstroImage::from_pixels(dims, out)))
    }

    /// Delete all spill files and reset the frame count.
    pub fn clear(&mut self) {
        for part in self.parts.drain(..) {
            let _ = fs::remove_file(&part.path);
        }
        let _ = fs::remove_dir(&self.spill_dir);
        self.dimensions = None;
        self.frames_added = 0;
        self.cancel.reset();
    }

    /// Partition rows into bands and create one empty spill file per band.
    fn create_parts(&mut self, dims: ImageDimensions) -> Result<(), Error> {
        fs::create_dir_all(&self.spill_dir).map_err(|e| Error::CreateSpillDir {
            path: self.spill_dir.clone(),
            source: e,
        })?;

        let row_bytes = (dims.row_len() * size_of::<f32>()) as u64;
        let band_bytes = row_bytes * self.expected_frames as u64;
        let band_rows = ((self.max_spill_bytes / band_bytes.max(1)) as usize)
            .clamp(1, dims.height);

        let mut start = 0;
        while start < dims.height {
            let end = (start + band_rows).min(dims.height) - 1;
            let path = self.spill_dir.join(format!("part_{:04}.bin", self.parts.len()));
            File::create(&path).map_err(|e| Error::CreateSpillFile {
                path: path.clone(),
                source: e,
            })?;
            self.parts.push(PartFile {
                path,
                start_row: start,
                end_row: end,
            });
            start = end + 1;
        }

        tracing::debug!(
            bands = self.parts.len(),
            band_rows,
            expected_frames = self.expected_frames,
            budget_bytes = self.max_spill_bytes,
            "spill layout created"
        );
        Ok(())
    }
}

impl Drop for FrameStacker {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Median over the non-zero samples; zero when every sample is zero.
fn median_excluding_zeros(values: &mut [f32]) -> f32 {
    let mut len = 0;
    for i in 0..values.len() {
        let v = values[i];
        if v != 0.0 {
            values[len] = v;
            len += 1;
        }
    }
    if len == 0 {
        return 0.0;
    }
    math::median_f32_mut(&mut values[..len])
}
