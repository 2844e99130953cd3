//! Scoped blocking of asynchronous signals.

use crate::error::{Error, Result};
use rustix::io::Errno;
use std::mem::MaybeUninit;

/// RAII guard that blocks every signal for the calling thread.
///
/// The mask in effect before [`SignalMaskGuard::block_all`] is restored when
/// the guard is dropped, on success and error paths alike.
pub(crate) struct SignalMaskGuard {
    previous: libc::sigset_t,
}

impl SignalMaskGuard {
    /// Block all signals until the guard is dropped.
    pub(crate) fn block_all() -> Result<Self> {
        let mut all = MaybeUninit::<libc::sigset_t>::uninit();
        let mut previous = MaybeUninit::<libc::sigset_t>::uninit();

        // SAFETY: both sets are written by libc before being read.
        unsafe {
            if libc::sigfillset(all.as_mut_ptr()) != 0 {
                return Err(Error::System(Errno::INVAL));
            }
            let rc = libc::pthread_sigmask(libc::SIG_BLOCK, all.as_ptr(), previous.as_mut_ptr());
            if rc != 0 {
                return Err(Error::System(Errno::from_raw_os_error(rc)));
            }
            Ok(Self {
                previous: previous.assume_init(),
            })
        }
    }
}

impl Drop for SignalMaskGuard {
    fn drop(&mut self) {
        // SAFETY: `previous` was filled in by pthread_sigmask.
        unsafe {
            libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}
