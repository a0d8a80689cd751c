use std::fs;
use std::io;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// File access for file system backed resources.
pub trait FileSystem: Send {
    /// Size of the regular file at `path`, `None` if there is none.
    fn stat(&self, path: &Path) -> Option<u64>;

    /// Open the file at `path` for reading.
    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>>;
}

/// [`FileSystem`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFs;

impl FileSystem for StdFs {
    fn stat(&self, path: &Path) -> Option<u64> {
        fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .map(|m| m.len())
    }

    fn open(&self, path: &Path) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(path)?))
    }
}

/// Content encodings of pre-compressed files, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// `br`, files ending `.br`.
    Brotli,
    /// `gzip`, files ending `.gz`.
    Gzip,
    /// `zstd`, files ending `.zst`.
    Zstd,
    /// `lz4`, files ending `.lz4`.
    Lz4,
    /// `deflate`, files ending `.zz`.
    Deflate,
}

const PREFERENCE: [Compression; 5] = [
    Compression::Brotli,
    Compression::Gzip,
    Compression::Zstd,
    Compression::Lz4,
    Compression::Deflate,
];

impl Compression {
    /// Token used in `Accept-Encoding` and `Content-Encoding`.
    pub fn token(self) -> &'static str {
        match self {
            Compression::Brotli => "br",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
            Compression::Deflate => "deflate",
        }
    }

    /// File name suffix of the pre-compressed sibling.
    pub fn extension(self) -> &'static str {
        match self {
            Compression::Brotli => "br",
            Compression::Gzip => "gz",
            Compression::Zstd => "zst",
            Compression::Lz4 => "lz4",
            Compression::Deflate => "zz",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of encodings a client accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptEncoding(u8);

impl AcceptEncoding {
    /// Parse an `Accept-Encoding` header value. Entries with `q=0` are left out.
    pub fn parse(value: &str) -> Self {
        let mut set = 0;
        for item in value.split(',') {
            let mut parts = item.split(';');
            let token = parts.next().unwrap_or("").trim();
            let refused = parts.any(|p| {
                let p = p.trim();
                p.starts_with("q=") && p[2..].trim().parse::<f32>().map(|q| q == 0.0).unwrap_or(false)
            });
            if refused {
                continue;
            }
            if token == "*" {
                set = PREFERENCE.iter().fold(set, |s, c| s | c.bit());
                continue;
            }
            if let Some(c) = PREFERENCE
                .iter()
                .find(|c| c.token().eq_ignore_ascii_case(token))
            {
                set |= c.bit();
            }
        }
        AcceptEncoding(set)
    }

    /// Whether `c` is in the set.
    pub fn accepts(self, c: Compression) -> bool {
        self.0 & c.bit() != 0
    }
}

/// A file chosen to answer a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ResolvedFile {
    pub path: PathBuf,
    pub size: u64,
    pub encoding: Option<Compression>,
    pub content_type: &'static str,
}

/// Map a request path onto a file under `root`, preferring a pre-compressed sibling the
/// client accepts. `None` for paths escaping the root and for missing files.
pub(crate) fn resolve(
    fs: &dyn FileSystem,
    root: &Path,
    url_path: &str,
    accept: AcceptEncoding,
    compression: bool,
) -> Option<ResolvedFile> {
    let rel = Path::new(url_path.trim_start_matches('/'));

    if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
        debug!("Refuse path outside of root: {}", url_path);
        return None;
    }

    let mut path = root.join(rel);
    if url_path.ends_with('/') || rel.as_os_str().is_empty() {
        path.push("index.html");
    }

    let content_type = mime_type(&path);

    if compression {
        for c in PREFERENCE.iter().filter(|c| accept.accepts(**c)) {
            let mut name = path.clone().into_os_string();
            name.push(".");
            name.push(c.extension());
            let candidate = PathBuf::from(name);
            if let Some(size) = fs.stat(&candidate) {
                trace!("Resolved {} to {:?} ({})", url_path, candidate, c.token());
                return Some(ResolvedFile {
                    path: candidate,
                    size,
                    encoding: Some(*c),
                    content_type,
                });
            }
        }
    }

    let size = fs.stat(&path)?;
    Some(ResolvedFile {
        path,
        size,
        encoding: None,
        content_type,
    })
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}
