//! perf_event syscall and ioctl primitives
//!
//! Counters are opened with `PERF_FORMAT_GROUP` so that one `read` on the
//! group leader returns every sibling value in open order. Handles are
//! returned as [`OwnedFd`], so a partially built group releases whatever it
//! already opened when it goes out of scope.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd};

use perf_event_open_sys as perf;
use perf_event_open_sys::bindings;

pub type Result<T> = std::result::Result<T, SysError>;

/// Errors that can occur while programming perf_event counters
#[derive(Debug, thiserror::Error)]
pub enum SysError {
    #[error("perf_event_open failed for type {type_} config 0x{config:X} (tid {tid}, cpu {cpu}): {source}")]
    OpenFailed {
        type_: u32,
        config: u64,
        tid: i32,
        cpu: i32,
        source: io::Error,
    },

    #[error("perf ioctl {op} failed on fd {fd}: {source}")]
    IoctlFailed {
        op: &'static str,
        fd: i32,
        source: io::Error,
    },

    #[error("Failed to read counter group on fd {fd}: {source}")]
    ReadFailed { fd: i32, source: io::Error },

    #[error("Short read on counter group fd {fd}: {len} bytes")]
    ShortRead { fd: i32, len: usize },
}

/// Attributes of a single counter in a read group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterAttr {
    pub type_: u32,
    pub config: u64,
    /// Request a 64-bit hardware counter (`config1` bit 0).
    pub counter_64bit: bool,
    pub inherit: bool,
    pub exclude_user: bool,
    pub exclude_kernel: bool,
}

impl CounterAttr {
    pub fn new(type_: u32, config: u64) -> Self {
        Self {
            type_,
            config,
            counter_64bit: false,
            inherit: false,
            exclude_user: false,
            exclude_kernel: false,
        }
    }

    pub fn hardware(config: u64) -> Self {
        Self::new(crate::PERF_TYPE_HARDWARE, config)
    }

    fn to_perf_attr(self) -> bindings::perf_event_attr {
        let mut attr = bindings::perf_event_attr {
            type_: self.type_,
            size: mem::size_of::<bindings::perf_event_attr>() as u32,
            config: self.config,
            read_format: bindings::PERF_FORMAT_GROUP as u64,
            ..Default::default()
        };
        attr.__bindgen_anon_3.config1 = u64::from(self.counter_64bit);
        attr.set_disabled(1);
        attr.set_inherit(u64::from(self.inherit));
        attr.set_exclude_user(u64::from(self.exclude_user));
        attr.set_exclude_kernel(u64::from(self.exclude_kernel));
        attr.set_exclude_hv(0);
        attr
    }
}

/// Open one counter, disabled, as a member of `group` (or as a new leader).
///
/// `tid` of -1 with a concrete `cpu` counts device wide; a thread id with
/// `cpu` -1 follows that thread on any CPU.
pub fn open_counter(
    attr: &CounterAttr,
    tid: i32,
    cpu: i32,
    group: Option<BorrowedFd<'_>>,
) -> Result<OwnedFd> {
    let mut perf_attr = attr.to_perf_attr();
    let group_fd = group.map_or(-1, |fd| fd.as_raw_fd());

    let fd = unsafe {
        perf::perf_event_open(
            &mut perf_attr,
            tid,
            cpu,
            group_fd,
            bindings::PERF_FLAG_FD_CLOEXEC as libc::c_ulong,
        )
    };
    if fd < 0 {
        return Err(SysError::OpenFailed {
            type_: attr.type_,
            config: attr.config,
            tid,
            cpu,
            source: io::Error::last_os_error(),
        });
    }

    // SAFETY: the kernel just handed us this descriptor and nobody else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn group_ioctl(
    fd: BorrowedFd<'_>,
    op: &'static str,
    call: unsafe fn(libc::c_int, libc::c_uint) -> libc::c_int,
) -> Result<()> {
    let raw = fd.as_raw_fd();
    let ret = unsafe { call(raw, bindings::PERF_IOC_FLAG_GROUP) };
    if ret == -1 {
        return Err(SysError::IoctlFailed {
            op,
            fd: raw,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Zero every counter in the group led by `leader`.
pub fn reset_group(leader: BorrowedFd<'_>) -> Result<()> {
    group_ioctl(leader, "RESET", perf::ioctls::RESET)
}

/// Start counting on every counter in the group led by `leader`.
pub fn enable_group(leader: BorrowedFd<'_>) -> Result<()> {
    group_ioctl(leader, "ENABLE", perf::ioctls::ENABLE)
}

/// Stop counting on every counter in the group led by `leader`.
pub fn disable_group(leader: BorrowedFd<'_>) -> Result<()> {
    group_ioctl(leader, "DISABLE", perf::ioctls::DISABLE)
}

/// Largest group a single read can report.
pub const MAX_GROUP_READ: usize = 64;

/// Read all values of a `PERF_FORMAT_GROUP` group in one syscall.
///
/// Fills `values` in open order and returns the number of counters the
/// kernel reported (which may exceed `values.len()`; extra values are dropped).
pub fn read_group(leader: BorrowedFd<'_>, values: &mut [u64]) -> Result<usize> {
    let raw = leader.as_raw_fd();
    // Layout: { u64 nr; u64 values[nr]; }
    let mut buffer = [0u64; MAX_GROUP_READ + 1];
    let len = unsafe {
        libc::read(
            raw,
            buffer.as_mut_ptr() as *mut libc::c_void,
            mem::size_of_val(&buffer),
        )
    };
    if len < 0 {
        return Err(SysError::ReadFailed {
            fd: raw,
            source: io::Error::last_os_error(),
        });
    }

    let len = len as usize;
    if len < mem::size_of::<u64>() {
        return Err(SysError::ShortRead { fd: raw, len });
    }

    let nr = buffer[0] as usize;
    let available = (len / mem::size_of::<u64>() - 1).min(nr);
    let copied = available.min(values.len());
    values[..copied].copy_from_slice(&buffer[1..=copied]);
    Ok(nr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsFd;

    #[test]
    fn test_sys_error_display() {
        let err = SysError::OpenFailed {
            type_: 0,
            config: 0,
            tid: 0,
            cpu: -1,
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(err.to_string().contains("perf_event_open failed"));
    }

    #[test]
    fn test_attr_sets_group_read_format() {
        let mut attr = CounterAttr::new(crate::PERF_TYPE_RAW, 0x11);
        attr.counter_64bit = true;
        attr.exclude_kernel = true;

        let perf_attr = attr.to_perf_attr();
        assert_eq!(perf_attr.type_, crate::PERF_TYPE_RAW);
        assert_eq!(perf_attr.config, 0x11);
        assert_eq!(perf_attr.read_format, bindings::PERF_FORMAT_GROUP as u64);
        assert_eq!(perf_attr.disabled(), 1);
        assert_eq!(perf_attr.exclude_kernel(), 1);
        assert_eq!(perf_attr.exclude_user(), 0);
        assert_eq!(unsafe { perf_attr.__bindgen_anon_3.config1 }, 1);
    }

    #[test]
    fn test_group_lifecycle() {
        let attr = CounterAttr::hardware(crate::PERF_COUNT_HW_INSTRUCTIONS);
        let leader = match open_counter(&attr, 0, -1, None) {
            Ok(fd) => fd,
            Err(e) => {
                eprintln!("skipping perf group test: {e}");
                return;
            }
        };

        reset_group(leader.as_fd()).unwrap();
        enable_group(leader.as_fd()).unwrap();
        let mut sum = 0u64;
        for i in 0..10_000u64 {
            sum = sum.wrapping_add(i * i);
        }
        std::hint::black_box(sum);
        disable_group(leader.as_fd()).unwrap();

        let mut values = [0u64; 4];
        let nr = read_group(leader.as_fd(), &mut values).unwrap();
        assert_eq!(nr, 1);
    }
}
