//! Reactor-side binding of the driver's socket.
//!
//! The driver owns its socket and may replace it between polling rounds
//! (notably during a reset). The engine never registers the driver's own
//! descriptor with the reactor: it registers a duplicate, so either side
//! can close its descriptor without invalidating the other's.

use std::io;
use std::mem;
#[cfg(test)]
use std::os::fd::AsRawFd;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tokio::io::unix::AsyncFd;
use tokio::io::{Interest, Ready};

use crate::error::Result;

/// Address family of the driver's socket, read back from the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Inet,
    Inet6,
    Unix,
    Other(i32),
}

/// A reactor-registered duplicate of the driver's socket descriptor.
///
/// The recorded `source` descriptor number is the identity token: as long
/// as the driver keeps reporting the same descriptor, the existing
/// registration is reused. Any change, including to no descriptor at all,
/// replaces or closes the binding.
pub(crate) struct BoundSocket {
    fd: Option<AsyncFd<OwnedFd>>,
    source: Option<RawFd>,
    family: Option<Family>,
}

impl BoundSocket {
    pub(crate) fn closed() -> Self {
        BoundSocket {
            fd: None,
            source: None,
            family: None,
        }
    }

    /// Bring the binding in line with the descriptor the driver currently
    /// reports.
    ///
    /// A duplication or family-query failure leaves the binding closed and
    /// is returned to the caller; the engine aborts the current operation
    /// with it rather than continuing on a stale registration.
    pub(crate) fn rebind(&mut self, source: Option<RawFd>) -> Result<()> {
        let Some(source) = source else {
            self.close();
            return Ok(());
        };

        if self.fd.is_some() && self.source == Some(source) {
            return Ok(());
        }

        self.close();

        let family = socket_family(source)?;
        let duplicate = dup_fd(source)?;
        let registered = AsyncFd::with_interest(duplicate, Interest::READABLE | Interest::WRITABLE)?;

        self.fd = Some(registered);
        self.source = Some(source);
        self.family = Some(family);
        Ok(())
    }

    pub(crate) fn close(&mut self) {
        self.fd = None;
        self.source = None;
        self.family = None;
    }

    pub(crate) fn is_open(&self) -> bool {
        self.fd.is_some()
    }

    #[cfg(test)]
    pub(crate) fn family(&self) -> Option<Family> {
        self.family
    }

    #[cfg(test)]
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.get_ref().as_raw_fd())
    }

    /// Wait until the socket is readable, then clear the readable edge so
    /// the next wait needs a fresh event. Never resolves while unbound.
    pub(crate) async fn readable(&self) -> io::Result<()> {
        match &self.fd {
            Some(fd) => {
                let mut guard = fd.readable().await?;
                guard.clear_ready_matching(Ready::READABLE);
                Ok(())
            }
            None => std::future::pending().await,
        }
    }

    /// Wait until the socket is writable; the writable counterpart of
    /// [`readable`](BoundSocket::readable).
    pub(crate) async fn writable(&self) -> io::Result<()> {
        match &self.fd {
            Some(fd) => {
                let mut guard = fd.writable().await?;
                guard.clear_ready_matching(Ready::WRITABLE);
                Ok(())
            }
            None => std::future::pending().await,
        }
    }
}

/// Address family of a descriptor, from its bound local address.
fn socket_family(fd: RawFd) -> io::Result<Family> {
    let mut addr: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let rc = unsafe { libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    Ok(match addr.ss_family as i32 {
        libc::AF_INET => Family::Inet,
        libc::AF_INET6 => Family::Inet6,
        libc::AF_UNIX => Family::Unix,
        other => Family::Other(other),
    })
}

fn dup_fd(fd: RawFd) -> io::Result<OwnedFd> {
    let duplicate = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if duplicate < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(unsafe { OwnedFd::from_raw_fd(duplicate) })
}
