//! Probing for external programs and environment variables.

use std::env;
use std::path::Path;

/// What the workflow manager needs to know about the host.
pub trait HostProbe {
    fn has_program(&self, program: &str) -> bool;
    fn has_env(&self, var: &str) -> bool;
}

impl<T: HostProbe + ?Sized> HostProbe for &T {
    fn has_program(&self, program: &str) -> bool {
        (**self).has_program(program)
    }

    fn has_env(&self, var: &str) -> bool {
        (**self).has_env(var)
    }
}

/// Probe backed by `PATH` and the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProbe;

impl HostProbe for SystemProbe {
    fn has_program(&self, program: &str) -> bool {
        if program.contains(std::path::MAIN_SEPARATOR) {
            return Path::new(program).is_file();
        }
        env::var_os("PATH")
            .map(|paths| env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
            .unwrap_or(false)
    }

    fn has_env(&self, var: &str) -> bool {
        env::var_os(var).is_some_and(|v| !v.is_empty())
    }
}
