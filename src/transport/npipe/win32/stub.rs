//! The no-op fallback for builds without the `kernel32` bindings.
//!
//! Opening hands out the null handle, reads signal EOF and writes report
//! zero written bytes. This keeps [NamedPipeSocket](super::super::NamedPipeSocket)
//! and the layers above it portable.
use super::{PipeHandle, PipeInfo, Win32Error};

pub(crate) fn create_file(
    _path: &str,
    _desired_access: u32,
    _share_mode: u32,
    _creation_disposition: u32,
    _flags_and_attributes: u32,
) -> Result<PipeHandle, Win32Error> {
    Ok(PipeHandle::NULL)
}

pub(crate) fn read_file(_handle: PipeHandle, _buffer: &mut [u8]) -> Result<usize, Win32Error> {
    Ok(0)
}

pub(crate) fn write_file(_handle: PipeHandle, _buffer: &[u8]) -> Result<usize, Win32Error> {
    Ok(0)
}

pub(crate) fn pipe_info(_handle: PipeHandle) -> Result<PipeInfo, Win32Error> {
    Ok(PipeInfo::default())
}

pub(crate) fn close_handle(_handle: PipeHandle) {}
