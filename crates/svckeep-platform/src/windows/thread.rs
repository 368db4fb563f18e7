//! Native worker threads.
//!
//! The worker is created with `CreateThread` under a security descriptor
//! with a null DACL, and PAUSE/CONTINUE/forced STOP act on the OS thread
//! through `SuspendThread`, `ResumeThread` and `TerminateThread`.

use std::ffi::c_void;
use std::io;

use windows::Win32::Foundation::{BOOL, CloseHandle, FALSE, HANDLE, TRUE};
use windows::Win32::Security::{
    InitializeSecurityDescriptor, PSECURITY_DESCRIPTOR, SECURITY_ATTRIBUTES, SECURITY_DESCRIPTOR,
    SetSecurityDescriptorDacl,
};
use windows::Win32::System::Threading::{
    CreateThread, ResumeThread, SuspendThread, THREAD_CREATION_FLAGS, TerminateThread,
};

use svckeep_core::{
    RuntimeError, SecurityContext, ThreadControl, WorkerBody, WorkerHandle, WorkerLaunch,
    WorkerSpawner,
};

use super::win_io;

const SECURITY_DESCRIPTOR_REVISION: u32 = 1;

/// Security descriptor granting all access, and the attributes pointing at it.
struct NullDacl {
    // boxed so `attributes` keeps pointing at it after a move
    descriptor: Box<SECURITY_DESCRIPTOR>,
    attributes: SECURITY_ATTRIBUTES,
}

// Both fields are plain data; the raw pointer in `attributes` refers to the
// boxed descriptor owned by the same value.
unsafe impl Send for NullDacl {}
unsafe impl Sync for NullDacl {}

impl NullDacl {
    fn new() -> io::Result<Self> {
        let mut descriptor = Box::new(SECURITY_DESCRIPTOR::default());
        let psd = PSECURITY_DESCRIPTOR(std::ptr::addr_of_mut!(*descriptor).cast());
        unsafe { InitializeSecurityDescriptor(psd, SECURITY_DESCRIPTOR_REVISION) }
            .ok()
            .map_err(|e| win_io(&e))?;
        unsafe { SetSecurityDescriptorDacl(psd, TRUE, None, FALSE) }
            .ok()
            .map_err(|e| win_io(&e))?;

        let attributes = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: psd.0,
            bInheritHandle: BOOL::from(false),
        };
        Ok(Self {
            descriptor,
            attributes,
        })
    }
}

impl std::fmt::Debug for NullDacl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullDacl")
            .field("descriptor", &std::ptr::addr_of!(*self.descriptor))
            .finish_non_exhaustive()
    }
}

/// Owned OS thread handle.
#[derive(Debug)]
pub struct NativeThread {
    handle: HANDLE,
}

// A thread handle may be used from any thread.
unsafe impl Send for NativeThread {}

impl ThreadControl for NativeThread {
    fn suspend(&self) -> io::Result<()> {
        if unsafe { SuspendThread(self.handle) } == u32::MAX {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn resume(&self) -> io::Result<()> {
        if unsafe { ResumeThread(self.handle) } == u32::MAX {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn terminate(&self) -> io::Result<()> {
        unsafe { TerminateThread(self.handle, 0) }
            .ok()
            .map_err(|e| win_io(&e))
    }
}

impl Drop for NativeThread {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.handle) };
    }
}

unsafe extern "system" fn worker_main(param: *mut c_void) -> u32 {
    // ownership of the body was handed over by `ScmSpawner::spawn`
    let body = unsafe { Box::from_raw(param.cast::<WorkerBody>()) };
    body.run();
    0
}

/// Spawns the worker as a native thread under a null-DACL descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScmSpawner;

impl WorkerSpawner for ScmSpawner {
    fn acquire_context(&self) -> Result<SecurityContext, RuntimeError> {
        NullDacl::new()
            .map(|dacl| SecurityContext::new("null-dacl", dacl))
            .map_err(|e| RuntimeError::security_context(e.to_string()))
    }

    fn spawn(&self, ctx: &SecurityContext, launch: WorkerLaunch) -> Result<WorkerHandle, RuntimeError> {
        let name = launch.thread_name().to_string();
        let attributes = ctx
            .guard::<NullDacl>()
            .map(|dacl| std::ptr::addr_of!(dacl.attributes));
        let (body, handle) = launch.into_parts();
        let param = Box::into_raw(Box::new(body));

        let created = unsafe {
            CreateThread(
                attributes,
                0,
                Some(worker_main),
                Some(param.cast_const().cast()),
                THREAD_CREATION_FLAGS(0),
                None,
            )
        };
        match created {
            Ok(thread) => {
                tracing::debug!(thread = %name, "spawned native worker thread");
                Ok(handle.with_native(Box::new(NativeThread { handle: thread })))
            }
            Err(e) => {
                // the thread never started, so the body is still ours
                drop(unsafe { Box::from_raw(param) });
                Err(RuntimeError::worker_spawn(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use svckeep_core::{WorkerContext, WorkerExit};

    #[test]
    fn test_null_dacl_context() {
        let ctx = ScmSpawner.acquire_context().unwrap();
        assert_eq!(ctx.kind(), "null-dacl");
        assert!(ctx.guard::<NullDacl>().is_some());
    }

    #[test]
    fn test_native_worker_reports_exit() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let entry = Arc::new(|ctx: WorkerContext| -> u32 { ctx.args().len() as u32 });
        let launch = WorkerLaunch::new("native-test", entry, vec!["a".into(), "b".into()], tx);

        let ctx = ScmSpawner.acquire_context().unwrap();
        let handle = ScmSpawner.spawn(&ctx, launch).unwrap();
        assert!(handle.is_native());

        let exit = rx.blocking_recv();
        assert_eq!(exit, Some(WorkerExit::Returned(2)));
        handle.release();
    }
}
