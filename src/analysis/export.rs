//! Persistence of the accumulated sample buffer as a NumPy `.npy` array.

use crate::decode::{CHANNELS, SLOTS, SUBSAMPLES};
use crate::store::StoreSnapshot;
use ndarray::{Array4, Axis};
use ndarray_npy::{write_npy, WriteNpyError};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Stacks every frame of `snapshot` into a `[frames][slot][channel][subsample]` array.
///
/// Returns `None` if `cancel` was raised between frames.
pub fn stack_frames(snapshot: &StoreSnapshot, cancel: &AtomicBool) -> Option<Array4<u16>> {
    let mut stacked = Array4::<u16>::zeros((snapshot.len(), SLOTS, CHANNELS, SUBSAMPLES));
    for (mut dest, frame) in stacked.axis_iter_mut(Axis(0)).zip(snapshot.iter()) {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        dest.assign(&frame.view());
    }
    Some(stacked)
}

/// Writes `array` to `path` in `.npy` format.
pub fn save_npy(path: &Path, array: &Array4<u16>) -> Result<(), WriteNpyError> {
    write_npy(path, array)?;
    tracing::info!(
        path = %path.display(),
        frames = array.len_of(Axis(0)),
        "Saved sample buffer"
    );
    Ok(())
}
