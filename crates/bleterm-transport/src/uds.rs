use std::io::{ErrorKind, Read, Write};
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::link::{decode_value, encode_value};
use crate::traits::{Advertisement, Transport, TransportEvent};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Back-off while the peer's receive queue is full.
const WRITE_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// One connected end of a stream-backed attribute link.
#[derive(Debug)]
struct LinkStream {
    stream: UnixStream,
    buf: BytesMut,
    scratch: BytesMut,
    max_value_size: usize,
}

impl LinkStream {
    fn new(stream: UnixStream, max_value_size: usize) -> Result<Self> {
        stream.set_nonblocking(true)?;
        Ok(Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            scratch: BytesMut::new(),
            max_value_size,
        })
    }

    /// Read everything available and hand complete values to `out`.
    ///
    /// Returns `Ok(false)` once the peer has closed its end, or has sent a
    /// value this end cannot accept. Values that arrived before either are
    /// still delivered.
    fn drain(&mut self, out: &mut dyn FnMut(Bytes)) -> Result<bool> {
        let mut open = true;
        loop {
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    open = false;
                    break;
                }
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
                    ) =>
                {
                    open = false;
                    break;
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match decode_value(&mut self.buf, self.max_value_size) {
                Ok(Some(value)) => out(value),
                Ok(None) => return Ok(open),
                Err(err) => {
                    warn!(error = %err, "peer broke the link protocol, dropping link");
                    self.buf.clear();
                    return Ok(false);
                }
            }
        }
    }

    fn write_value(&mut self, value: &[u8]) -> Result<()> {
        if value.len() > self.max_value_size {
            return Err(TransportError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_size,
            });
        }

        self.scratch.clear();
        encode_value(value, &mut self.scratch)?;

        let mut offset = 0usize;
        while offset < self.scratch.len() {
            match self.stream.write(&self.scratch[offset..]) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WRITE_RETRY_INTERVAL);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match self.stream.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(WRITE_RETRY_INTERVAL);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Peripheral end of a Unix domain socket link.
///
/// `begin` binds the socket path (the "advertisement"); each accepted central
/// is one connection. Only one central is served at a time; others wait in
/// the listen backlog until the current one disconnects.
pub struct UdsPeripheral {
    path: PathBuf,
    mode: u32,
    listener: Option<UnixListener>,
    created_inode: Option<(u64, u64)>,
    link: Option<LinkStream>,
    peer: Option<String>,
    value_size: usize,
    accepted: u64,
}

impl UdsPeripheral {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Create a peripheral that will advertise on `path` once started.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self::with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Create a peripheral with an explicit socket permission mode.
    pub fn with_mode(path: impl AsRef<Path>, mode: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode,
            listener: None,
            created_inode: None,
            link: None,
            peer: None,
            value_size: 0,
            accepted: 0,
        }
    }

    /// The socket path this peripheral advertises on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `begin` has bound the socket.
    pub fn is_advertising(&self) -> bool {
        self.listener.is_some()
    }

    fn bind(&mut self) -> Result<UnixListener> {
        let path = self.path.clone();
        check_path_len(&path)?;

        // Remove stale socket if it exists, but never remove non-socket files.
        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
            if !metadata.file_type().is_socket() {
                return Err(TransportError::Bind {
                    path,
                    source: std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                });
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(|e| TransportError::Bind {
                path: path.clone(),
                source: e,
            })?;
        }

        let listener = UnixListener::bind(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(self.mode)).map_err(
            |e| TransportError::Bind {
                path: path.clone(),
                source: e,
            },
        )?;
        let created = std::fs::symlink_metadata(&path).map_err(|e| TransportError::Bind {
            path: path.clone(),
            source: e,
        })?;
        self.created_inode = Some((created.dev(), created.ino()));

        listener
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind { path, source: e })?;
        Ok(listener)
    }

    fn accept_central(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()> {
        let Some(listener) = &self.listener else {
            return Err(TransportError::NotStarted);
        };
        let stream = match listener.accept() {
            Ok((stream, _addr)) => stream,
            Err(err) if err.kind() == ErrorKind::WouldBlock => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(err) => return Err(TransportError::Accept(err)),
        };

        self.accepted += 1;
        let peer = format!("central-{}", self.accepted);
        self.link = Some(LinkStream::new(stream, self.value_size)?);
        self.peer = Some(peer.clone());
        debug!(%peer, "accepted central");
        dispatch(TransportEvent::Connected { peer });
        Ok(())
    }
}

impl Transport for UdsPeripheral {
    fn begin(&mut self, advertisement: &Advertisement) -> Result<()> {
        self.value_size = advertisement.value_size;
        let listener = self.bind()?;
        self.listener = Some(listener);
        info!(
            path = ?self.path,
            name = %advertisement.local_name,
            service = %advertisement.service_id,
            characteristic = %advertisement.characteristic_id,
            value_size = advertisement.value_size,
            "advertising on unix domain socket"
        );
        Ok(())
    }

    fn poll(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()> {
        if self.link.is_none() {
            self.accept_central(dispatch)?;
        }

        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };
        let open = link.drain(&mut |value| dispatch(TransportEvent::Written(value)))?;
        if !open {
            self.link = None;
            let peer = self.peer.take().unwrap_or_default();
            debug!(%peer, "central closed link");
            dispatch(TransportEvent::Disconnected { peer });
        }
        Ok(())
    }

    fn write_value(&mut self, value: &[u8]) -> Result<()> {
        match self.link.as_mut() {
            Some(link) => link.write_value(value),
            None if self.listener.is_none() => Err(TransportError::NotStarted),
            None => Err(TransportError::NotConnected),
        }
    }

    fn transport_name(&self) -> &'static str {
        "uds-peripheral"
    }
}

impl Drop for UdsPeripheral {
    fn drop(&mut self) {
        if self.listener.is_none() {
            return;
        }
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
                if metadata.file_type().is_socket()
                    && metadata.dev() == expected_dev
                    && metadata.ino() == expected_ino
                {
                    debug!(path = ?self.path, "cleaning up socket file");
                    let _ = std::fs::remove_file(&self.path);
                } else {
                    debug!(
                        path = ?self.path,
                        "socket path identity changed; skipping cleanup"
                    );
                }
            }
        }
    }
}

/// Central end of a Unix domain socket link.
///
/// `begin` connects to a peripheral's socket path; the connection is reported
/// as [`TransportEvent::Connected`] on the first `poll`.
pub struct UdsCentral {
    path: PathBuf,
    link: Option<LinkStream>,
    started: bool,
    announced: bool,
}

impl UdsCentral {
    /// Create a central that will connect to `path` once started.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            link: None,
            started: false,
            announced: false,
        }
    }

    /// The peripheral socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UdsCentral {
    fn begin(&mut self, advertisement: &Advertisement) -> Result<()> {
        check_path_len(&self.path)?;
        let stream = UnixStream::connect(&self.path).map_err(|e| TransportError::Connect {
            path: self.path.clone(),
            source: e,
        })?;
        self.link = Some(LinkStream::new(stream, advertisement.value_size)?);
        self.started = true;
        debug!(path = ?self.path, "connected to peripheral");
        Ok(())
    }

    fn poll(&mut self, dispatch: &mut dyn FnMut(TransportEvent)) -> Result<()> {
        if !self.started {
            return Err(TransportError::NotStarted);
        }
        let peer = self.path.display().to_string();
        let Some(link) = self.link.as_mut() else {
            return Ok(());
        };

        if !self.announced {
            self.announced = true;
            dispatch(TransportEvent::Connected { peer: peer.clone() });
        }

        let open = link.drain(&mut |value| dispatch(TransportEvent::Written(value)))?;
        if !open {
            self.link = None;
            debug!(%peer, "peripheral closed link");
            dispatch(TransportEvent::Disconnected { peer });
        }
        Ok(())
    }

    fn write_value(&mut self, value: &[u8]) -> Result<()> {
        match self.link.as_mut() {
            Some(link) => link.write_value(value),
            None if !self.started => Err(TransportError::NotStarted),
            None => Err(TransportError::NotConnected),
        }
    }

    fn transport_name(&self) -> &'static str {
        "uds-central"
    }
}
