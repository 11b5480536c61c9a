// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of acad-cmd and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Incremental readers over the application's command-line log.
//!
//! The application appends to its log file asynchronously and never tells us when. A stream is
//! a byte cursor into that file; reads hand out whatever was appended since the cursor. Streams
//! in `lastprompt` mode have no file and always read empty.

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_RING_CAPACITY: usize = 200;
pub const DEFAULT_TAIL_BYTES: u64 = 8192;
pub const DEFAULT_MAX_BYTES: u64 = 65536;
pub const DEFAULT_LOGFILE_NAME: &str = "acad-commandline.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Logfile,
    Lastprompt,
}

#[derive(Debug, Clone)]
pub struct OutputStream {
    stream_id: String,
    mode: StreamMode,
    logfile_path: Option<PathBuf>,
    cursor: u64,
    ring: VecDeque<String>,
    started_by_server: bool,
}

impl OutputStream {
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn logfile_path(&self) -> Option<&Path> {
        self.logfile_path.as_deref()
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Whether this stream's start switched the application's logging on.
    pub fn started_by_server(&self) -> bool {
        self.started_by_server
    }

    /// Recently read chunks, oldest first.
    pub fn recent_chunks(&self) -> impl Iterator<Item = &str> {
        self.ring.iter().map(String::as_str)
    }

    fn log_path(&self) -> Option<&Path> {
        match self.mode {
            StreamMode::Logfile => self.logfile_path.as_deref(),
            StreamMode::Lastprompt => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadChunk {
    pub text: String,
    pub new_cursor: u64,
    /// More bytes were available than `max_bytes` allowed.
    pub truncated: bool,
}

impl ReadChunk {
    fn empty(cursor: u64) -> Self {
        Self { text: String::new(), new_cursor: cursor, truncated: false }
    }
}

#[derive(Debug)]
pub struct OutputStreamManager {
    base_dir: PathBuf,
    ring_capacity: usize,
    /// Codepage for log bytes that are not UTF-8.
    encoding: Option<&'static Encoding>,
    // Insertion order; the oldest remaining stream inherits the default role.
    streams: Vec<OutputStream>,
    default_id: Option<String>,
    logging_owned_by_server: bool,
}

impl OutputStreamManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        if let Err(err) = fs::create_dir_all(&base_dir) {
            tracing::warn!(dir = %base_dir.display(), %err, "could not create log directory");
        }
        Self {
            base_dir,
            ring_capacity: DEFAULT_RING_CAPACITY,
            encoding: platform_encoding(),
            streams: Vec::new(),
            default_id: None,
            logging_owned_by_server: false,
        }
    }

    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity.max(1);
        self
    }

    pub fn with_encoding(mut self, encoding: Option<&'static Encoding>) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn default_logfile_path(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_LOGFILE_NAME)
    }

    pub fn get(&self, stream_id: &str) -> Option<&OutputStream> {
        self.streams.iter().find(|stream| stream.stream_id == stream_id)
    }

    fn get_mut(&mut self, stream_id: &str) -> Option<&mut OutputStream> {
        self.streams.iter_mut().find(|stream| stream.stream_id == stream_id)
    }

    pub fn default_stream(&self) -> Option<&OutputStream> {
        self.default_id.as_deref().and_then(|id| self.get(id))
    }

    /// Make an existing stream the default again. Returns `false` for unknown ids.
    pub fn set_default(&mut self, stream_id: &str) -> bool {
        if self.get(stream_id).is_none() {
            return false;
        }
        self.default_id = Some(stream_id.to_owned());
        true
    }

    /// The default stream, if it tails a log file.
    pub fn default_logfile_stream(&self) -> Option<&OutputStream> {
        self.default_stream().filter(|stream| stream.log_path().is_some())
    }

    pub fn has_logfile_stream(&self) -> bool {
        self.streams.iter().any(|stream| stream.log_path().is_some())
    }

    /// Record that the server switched the application's logging on.
    pub fn mark_logging_enabled_by_server(&mut self) {
        self.logging_owned_by_server = true;
    }

    /// When the last logfile stream is gone and the server owns logging, release ownership and
    /// return `true` so the caller switches logging back off.
    pub fn release_logging_if_unused(&mut self) -> bool {
        if self.logging_owned_by_server && !self.has_logfile_stream() {
            self.logging_owned_by_server = false;
            return true;
        }
        false
    }

    fn insert(&mut self, stream: OutputStream) -> &OutputStream {
        let id = stream.stream_id.clone();
        self.streams.retain(|existing| existing.stream_id != id);
        self.streams.push(stream);
        self.default_id = Some(id);
        let idx = self.streams.len() - 1;
        &self.streams[idx]
    }

    /// Start tailing `path`. The cursor starts at the current end of the file; with `reset` the
    /// file is truncated first so earlier output is never delivered.
    pub fn start_logfile_stream(
        &mut self,
        stream_id: String,
        path: PathBuf,
        reset: bool,
        started_by_server: bool,
    ) -> &OutputStream {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                tracing::debug!(dir = %parent.display(), %err, "could not create log parent");
            }
        }

        let cursor = if reset {
            match truncate(&path) {
                Ok(()) => 0,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "log truncation failed");
                    file_size(&path)
                }
            }
        } else {
            file_size(&path)
        };

        tracing::info!(%stream_id, path = %path.display(), cursor, "logfile stream started");
        let stream = OutputStream {
            stream_id,
            mode: StreamMode::Logfile,
            logfile_path: Some(path),
            cursor,
            ring: VecDeque::new(),
            started_by_server,
        };
        self.insert(stream)
    }

    pub fn start_lastprompt_stream(&mut self, stream_id: String) -> &OutputStream {
        tracing::info!(%stream_id, "lastprompt stream started");
        let stream = OutputStream {
            stream_id,
            mode: StreamMode::Lastprompt,
            logfile_path: None,
            cursor: 0,
            ring: VecDeque::new(),
            started_by_server: false,
        };
        self.insert(stream)
    }

    /// Remove a stream. `None` when the id is unknown.
    pub fn stop(&mut self, stream_id: &str) -> Option<OutputStream> {
        let idx = self.streams.iter().position(|stream| stream.stream_id == stream_id)?;
        let stream = self.streams.remove(idx);
        if self.default_id.as_deref() == Some(stream_id) {
            self.default_id = self.streams.first().map(|stream| stream.stream_id.clone());
        }
        tracing::info!(%stream_id, "stream stopped");
        Some(stream)
    }

    /// Read at most `max_bytes` appended after `cursor`.
    ///
    /// A cursor past the end of the file (the file shrank) is clamped to its size. Non-empty reads
    /// move the stored cursor forward; re-reading from an older cursor never moves it back.
    pub fn read_new(
        &mut self,
        stream_id: &str,
        cursor: u64,
        max_bytes: u64,
    ) -> Result<ReadChunk, BridgeError> {
        let ring_capacity = self.ring_capacity;
        let encoding = self.encoding;
        let stream = self
            .get_mut(stream_id)
            .ok_or_else(|| BridgeError::UnknownStream(stream_id.to_owned()))?;
        let Some(path) = stream.log_path().map(Path::to_path_buf) else {
            return Ok(ReadChunk::empty(cursor));
        };
        if !path.exists() {
            return Ok(ReadChunk::empty(cursor));
        }

        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();
        stream.cursor = stream.cursor.min(size);
        let cursor = cursor.min(size);
        let to_read = max_bytes.min(size - cursor);
        if to_read == 0 {
            return Ok(ReadChunk::empty(cursor));
        }

        file.seek(SeekFrom::Start(cursor))?;
        let mut data = Vec::with_capacity(to_read as usize);
        file.take(to_read).read_to_end(&mut data)?;

        let (text, consumed) = decode_prefix(&data, encoding);
        let new_cursor = cursor + consumed as u64;
        if !text.is_empty() {
            stream.ring.push_back(text.clone());
            while stream.ring.len() > ring_capacity {
                stream.ring.pop_front();
            }
            stream.cursor = stream.cursor.max(new_cursor);
        }

        Ok(ReadChunk { text, new_cursor, truncated: new_cursor < size })
    }

    /// Last `tail_bytes` of the stream's file, independent of its cursor.
    pub fn read_tail(&self, stream_id: &str, tail_bytes: u64) -> Result<String, BridgeError> {
        let stream =
            self.get(stream_id).ok_or_else(|| BridgeError::UnknownStream(stream_id.to_owned()))?;
        let Some(path) = stream.log_path() else {
            return Ok(String::new());
        };
        if !path.exists() {
            return Ok(String::new());
        }

        let mut file = File::open(path)?;
        let size = file.metadata()?.len();
        let start = size.saturating_sub(tail_bytes);
        file.seek(SeekFrom::Start(start))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        Ok(decode(&data, self.encoding))
    }
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|meta| meta.len()).unwrap_or(0)
}

fn truncate(path: &Path) -> std::io::Result<()> {
    OpenOptions::new().create(true).write(true).truncate(true).open(path).map(|_| ())
}

/// The ANSI codepage the application writes its log in. `None` off Windows.
pub fn platform_encoding() -> Option<&'static Encoding> {
    static ENCODING: OnceLock<Option<&'static Encoding>> = OnceLock::new();
    *ENCODING.get_or_init(|| {
        let encoding = platform_codepage().and_then(encoding_for_codepage);
        tracing::debug!(encoding = encoding.map(Encoding::name), "log text encoding");
        encoding
    })
}

#[cfg(windows)]
fn platform_codepage() -> Option<u32> {
    // SAFETY: GetACP reads process state and has no preconditions.
    Some(unsafe { windows::Win32::Globalization::GetACP() })
}

#[cfg(not(windows))]
fn platform_codepage() -> Option<u32> {
    None
}

/// Windows codepage number to its encoding; unknown codepages map to `None`.
pub fn encoding_for_codepage(codepage: u32) -> Option<&'static Encoding> {
    let encoding = match codepage {
        874 => encoding_rs::WINDOWS_874,
        932 => encoding_rs::SHIFT_JIS,
        936 => encoding_rs::GBK,
        949 => encoding_rs::EUC_KR,
        950 => encoding_rs::BIG5,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1252 => encoding_rs::WINDOWS_1252,
        1253 => encoding_rs::WINDOWS_1253,
        1254 => encoding_rs::WINDOWS_1254,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        20866 => encoding_rs::KOI8_R,
        21866 => encoding_rs::KOI8_U,
        65001 => encoding_rs::UTF_8,
        _ => return None,
    };
    Some(encoding)
}

/// Decode log bytes: UTF-8 first, then `encoding`, then Latin-1, so decoding never fails.
pub fn decode(bytes: &[u8], encoding: Option<&'static Encoding>) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_owned();
    }
    if let Some(encoding) = encoding.filter(|encoding| *encoding != encoding_rs::UTF_8) {
        let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }
    latin1(bytes)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&byte| char::from(byte)).collect()
}

/// Like [`decode`], but a UTF-8 sequence cut off by the read limit is left unconsumed.
/// Returns the text and the number of bytes it covers.
fn decode_prefix(bytes: &[u8], encoding: Option<&'static Encoding>) -> (String, usize) {
    match std::str::from_utf8(bytes) {
        Ok(text) => (text.to_owned(), bytes.len()),
        Err(err) if err.error_len().is_none() && err.valid_up_to() > 0 => {
            let valid = err.valid_up_to();
            (String::from_utf8_lossy(&bytes[..valid]).into_owned(), valid)
        }
        Err(_) => (decode(bytes, encoding), bytes.len()),
    }
}
