//! Process hardening.
//!
//! The identifier-vault key and the API token live in memory for the whole
//! process lifetime, so core dumps are switched off before either is loaded.

/// Disable core dumps by setting `RLIMIT_CORE` to 0.
///
/// Call this early in `main()`, before any secret is read.
///
/// # Errors
///
/// Returns an error string if the `setrlimit` syscall fails.
#[cfg(unix)]
pub fn disable_core_dumps() -> Result<(), String> {
    // SAFETY: `setrlimit` only reads the `rlimit` struct passed by reference,
    // which lives on the stack for the duration of the call.
    #[allow(unsafe_code)]
    let result = unsafe {
        let rlim = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        libc::setrlimit(libc::RLIMIT_CORE, &rlim)
    };

    if result == 0 {
        Ok(())
    } else {
        Err(format!(
            "setrlimit(RLIMIT_CORE, 0) failed: {}",
            std::io::Error::last_os_error()
        ))
    }
}

/// No-op on non-Unix platforms.
#[cfg(not(unix))]
pub fn disable_core_dumps() -> Result<(), String> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn core_limit_is_zero_afterwards() {
        assert!(disable_core_dumps().is_ok());

        let mut rlim = libc::rlimit {
            rlim_cur: 1,
            rlim_max: 1,
        };
        // SAFETY: `getrlimit` writes into the struct we own.
        #[allow(unsafe_code)]
        let result = unsafe { libc::getrlimit(libc::RLIMIT_CORE, &mut rlim) };
        assert_eq!(result, 0);
        assert_eq!(rlim.rlim_cur, 0);
    }
}
