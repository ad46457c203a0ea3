use std::borrow::Cow;

use bytemuck::Pod;

/// Reinterprets `bytes` as a slice of `T` without copying when the slice is
/// suitably aligned, and falls back to an owned copy when it is not.
///
/// Returns `None` when the byte length is not a multiple of `size_of::<T>()`.
/// Values are read in native byte order; VIM data is little-endian.
pub fn pod_view<T: Pod>(bytes: &[u8]) -> Option<Cow<'_, [T]>> {
    let width = std::mem::size_of::<T>();
    if width == 0 || bytes.len() % width != 0 {
        return None;
    }
    match bytemuck::try_cast_slice::<u8, T>(bytes) {
        Ok(view) => Some(Cow::Borrowed(view)),
        Err(_) => Some(Cow::Owned(bytemuck::pod_collect_to_vec::<u8, T>(bytes))),
    }
}
