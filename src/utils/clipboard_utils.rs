use byteorder::{LittleEndian, WriteBytesExt};
use image::RgbaImage;

use crate::{error::Result, utils::image_utils::rgba_to_bgra};

const BITMAP_INFO_HEADER_SIZE: u32 = 40;
const BI_RGB: u32 = 0;
const PELS_PER_METER: i32 = 3780;

/// Packs an image as a packed device independent bitmap: a `BITMAPINFOHEADER`
/// followed by bottom-up 32-bit BGRA rows.
pub fn image_to_dib(image: &RgbaImage) -> Result<Vec<u8>> {
    let (width, height) = image.dimensions();
    let row = width as usize * 4;
    let mut out = Vec::with_capacity(BITMAP_INFO_HEADER_SIZE as usize + row * height as usize);
    out.write_u32::<LittleEndian>(BITMAP_INFO_HEADER_SIZE)?;
    out.write_i32::<LittleEndian>(width as i32)?;
    out.write_i32::<LittleEndian>(height as i32)?;
    out.write_u16::<LittleEndian>(1)?;
    out.write_u16::<LittleEndian>(32)?;
    out.write_u32::<LittleEndian>(BI_RGB)?;
    out.write_u32::<LittleEndian>((row * height as usize) as u32)?;
    out.write_i32::<LittleEndian>(PELS_PER_METER)?;
    out.write_i32::<LittleEndian>(PELS_PER_METER)?;
    out.write_u32::<LittleEndian>(0)?;
    out.write_u32::<LittleEndian>(0)?;
    let bgra = rgba_to_bgra(image.as_raw());
    if row > 0 {
        for line in bgra.chunks_exact(row).rev() {
            out.extend_from_slice(line);
        }
    }
    Ok(out)
}

#[cfg(windows)]
pub fn copy_image(image: &RgbaImage) -> Result<()> {
    use std::io;

    use windows::Win32::{
        Foundation::{GlobalFree, HANDLE, HGLOBAL},
        System::{
            DataExchange::{CloseClipboard, EmptyClipboard, OpenClipboard, SetClipboardData},
            Memory::{GMEM_MOVEABLE, GlobalAlloc, GlobalLock, GlobalUnlock},
            Ole::CF_DIB,
        },
    };

    use crate::error::Error;

    struct ScopedClipboard;

    impl Drop for ScopedClipboard {
        fn drop(&mut self) {
            unsafe {
                let _ = CloseClipboard();
            }
        }
    }

    /// Frees the allocation unless ownership passed to the clipboard.
    struct AutoGlobal(HGLOBAL);

    impl Drop for AutoGlobal {
        fn drop(&mut self) {
            if !self.0.0.is_null() {
                unsafe {
                    let _ = GlobalFree(Some(self.0));
                }
            }
        }
    }

    fn win_error(e: windows::core::Error) -> Error {
        Error::Io(io::Error::other(e.to_string()))
    }

    let dib = image_to_dib(image)?;
    let memory = AutoGlobal(unsafe { GlobalAlloc(GMEM_MOVEABLE, dib.len()) }.map_err(win_error)?);
    unsafe {
        let target = GlobalLock(memory.0).cast::<u8>();
        if target.is_null() {
            return Err(win_error(windows::core::Error::from_win32()));
        }
        std::ptr::copy_nonoverlapping(dib.as_ptr(), target, dib.len());
        let _ = GlobalUnlock(memory.0);
    }

    unsafe { OpenClipboard(None) }.map_err(win_error)?;
    let _clipboard = ScopedClipboard;
    unsafe { EmptyClipboard() }.map_err(win_error)?;
    unsafe { SetClipboardData(u32::from(CF_DIB.0), Some(HANDLE(memory.0.0))) }.map_err(win_error)?;
    std::mem::forget(memory);
    log::debug!("copied {}x{} bitmap to the clipboard", image.width(), image.height());
    Ok(())
}

#[cfg(not(windows))]
pub fn copy_image(_image: &RgbaImage) -> Result<()> {
    Err(crate::error::Error::Unsupported(
        "clipboard access is only available on Windows".to_owned(),
    ))
}
