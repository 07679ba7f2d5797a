use std::ffi::OsStr;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::ptr;

use winapi::shared::minwindef::DWORD;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::fileapi::{CreateFileW, ReadFile, WriteFile};
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::namedpipeapi::GetNamedPipeInfo;
use winapi::um::winnt::HANDLE;

use super::{PipeHandle, PipeInfo, Win32Error};

fn last_error(function: &'static str, message: String) -> Win32Error {
    let code = unsafe { GetLastError() };
    Win32Error::new(code, function, message)
}

/// Open an existing named pipe via `CreateFileW`.
/// Windows expects the path as a NUL terminated UTF-16 string.
pub(crate) fn create_file(
    path: &str,
    desired_access: u32,
    share_mode: u32,
    creation_disposition: u32,
    flags_and_attributes: u32,
) -> Result<PipeHandle, Win32Error> {
    let wide_path: Vec<u16> = OsStr::new(path).encode_wide().chain(once(0)).collect();

    let handle = unsafe {
        CreateFileW(
            wide_path.as_ptr(),
            desired_access,
            share_mode,
            ptr::null_mut(),
            creation_disposition,
            flags_and_attributes,
            ptr::null_mut(),
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        return Err(last_error(
            "CreateFileW",
            format!("Failed to open named pipe {path}"),
        ));
    }

    Ok(PipeHandle(handle as usize))
}

/// Issue a single `ReadFile` request for up to `buffer.len()` bytes.
pub(crate) fn read_file(handle: PipeHandle, buffer: &mut [u8]) -> Result<usize, Win32Error> {
    let mut bytes_read: DWORD = 0;

    let result = unsafe {
        ReadFile(
            handle.0 as HANDLE,
            buffer.as_mut_ptr() as *mut winapi::ctypes::c_void,
            buffer.len() as DWORD,
            &mut bytes_read,
            ptr::null_mut(),
        )
    };

    if result == 0 {
        return Err(last_error(
            "ReadFile",
            "Failed to read from named pipe".to_string(),
        ));
    }

    Ok(bytes_read as usize)
}

/// Issue a single `WriteFile` request for the whole buffer.
pub(crate) fn write_file(handle: PipeHandle, buffer: &[u8]) -> Result<usize, Win32Error> {
    let mut bytes_written: DWORD = 0;

    let result = unsafe {
        WriteFile(
            handle.0 as HANDLE,
            buffer.as_ptr() as *const winapi::ctypes::c_void,
            buffer.len() as DWORD,
            &mut bytes_written,
            ptr::null_mut(),
        )
    };

    if result == 0 {
        return Err(last_error(
            "WriteFile",
            "Failed to write to named pipe".to_string(),
        ));
    }

    Ok(bytes_written as usize)
}

/// Query the static pipe properties via `GetNamedPipeInfo`.
pub(crate) fn pipe_info(handle: PipeHandle) -> Result<PipeInfo, Win32Error> {
    let mut flags: DWORD = 0;
    let mut out_buffer_size: DWORD = 0;
    let mut in_buffer_size: DWORD = 0;
    let mut max_instances: DWORD = 0;

    let result = unsafe {
        GetNamedPipeInfo(
            handle.0 as HANDLE,
            &mut flags,
            &mut out_buffer_size,
            &mut in_buffer_size,
            &mut max_instances,
        )
    };

    if result == 0 {
        return Err(last_error(
            "GetNamedPipeInfo",
            "Failed to query named pipe".to_string(),
        ));
    }

    Ok(PipeInfo {
        flags,
        out_buffer_size,
        in_buffer_size,
        max_instances,
    })
}

/// Close the handle. Closing the null handle is a no-op.
pub(crate) fn close_handle(handle: PipeHandle) {
    if handle == PipeHandle::NULL {
        return;
    }

    unsafe {
        CloseHandle(handle.0 as HANDLE);
    }
}
