//! Current-working-directory provider.

use std::cell::RefCell;

/// Source of the current working directory used to resolve relative paths.
///
/// The filesystem core treats this as an external collaborator; task
/// runtimes plug in their own notion of "current task's cwd".
pub trait CwdProvider: Send + Sync {
    /// Absolute current working directory for the calling thread.
    fn current_dir(&self) -> String;
}

thread_local! {
    static CWD: RefCell<String> = RefCell::new("/".to_owned());
}

/// Default provider keeping one cwd per OS thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadCwd;

impl ThreadCwd {
    /// Set the calling thread's working directory. The path is taken as
    /// given; resolution and normalization happen at lookup time.
    pub fn set(path: &str) {
        CWD.with(|cwd| *cwd.borrow_mut() = path.to_owned());
    }
}

impl CwdProvider for ThreadCwd {
    fn current_dir(&self) -> String {
        CWD.with(|cwd| cwd.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cwd_is_per_thread() {
        ThreadCwd::set("/user");
        assert_eq!(ThreadCwd.current_dir(), "/user");

        std::thread::spawn(|| {
            assert_eq!(ThreadCwd.current_dir(), "/");
        })
        .join()
        .unwrap();
    }
}
