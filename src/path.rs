//! Interned, hierarchical, reference-counted paths.
//!
//! A [`VfsPath`] is a shared handle to an immutable node holding one path
//! component and a link to its parent. Nodes are shared by every path below
//! them, so a directory with ten thousand children stores its own prefix once.
//!
//! The [`PathInterner`] owns the permanent nodes: the filesystem root, every
//! component of the user's home directory (the "home spine") and the trash
//! root. Paths resolved or built below `$HOME` reuse the spine nodes instead of
//! allocating duplicates.

use std::ffi::OsStr;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::{CoreError, Result};
use crate::helpers::canonical_components;
use crate::uri::{self, FILE_URI_PREFIX, TRASH_URI_PREFIX};

/// Suggested buffer size for [`VfsPath::to_string_buf`].
pub const PATH_MAX_STRLEN: usize = 4096;

/// Suggested buffer size for [`VfsPath::to_uri_buf`].
pub const PATH_MAX_URILEN: usize = 3 * PATH_MAX_STRLEN + 9;

const ROOT_NAME: &[u8] = b"/";

/// The namespace a path lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathScheme {
    /// Local filesystem (`file:///`).
    File,
    /// The synthetic trash namespace (`trash:///`).
    Trash,
}

impl PathScheme {
    pub fn uri_prefix(self) -> &'static str {
        match self {
            Self::File => FILE_URI_PREFIX,
            Self::Trash => TRASH_URI_PREFIX,
        }
    }

    fn tag(self) -> u32 {
        match self {
            Self::File => 0,
            Self::Trash => 1,
        }
    }
}

struct PathNode {
    scheme: PathScheme,
    name: Box<[u8]>,
    parent: Option<VfsPath>,
}

impl Drop for PathNode {
    // Release the parent chain iteratively so that dropping a very deep path
    // does not recurse once per component.
    fn drop(&mut self) {
        let mut next = self.parent.take();
        while let Some(VfsPath(node)) = next {
            match Arc::try_unwrap(node) {
                Ok(mut inner) => next = inner.parent.take(),
                Err(_) => break,
            }
        }
    }
}

/// A shared handle to an interned path node.
///
/// Cloning is an atomic reference count increment; dropping the last handle to
/// a node releases it and then its parent in turn.
#[derive(Clone)]
pub struct VfsPath(Arc<PathNode>);

impl VfsPath {
    fn new_root(scheme: PathScheme) -> Self {
        VfsPath(Arc::new(PathNode {
            scheme,
            name: ROOT_NAME.into(),
            parent: None,
        }))
    }

    fn new_child(parent: &VfsPath, name: &[u8]) -> Self {
        VfsPath(Arc::new(PathNode {
            scheme: parent.scheme(),
            name: name.into(),
            parent: Some(parent.clone()),
        }))
    }

    pub fn scheme(&self) -> PathScheme {
        self.0.scheme
    }

    pub fn is_local(&self) -> bool {
        self.scheme() == PathScheme::File
    }

    pub fn is_trash(&self) -> bool {
        self.scheme() == PathScheme::Trash
    }

    /// True for the filesystem root and the trash root.
    pub fn is_root(&self) -> bool {
        self.0.parent.is_none()
    }

    pub fn parent(&self) -> Option<&VfsPath> {
        self.0.parent.as_ref()
    }

    /// Raw bytes of the last component (`/` for a root).
    pub fn name_bytes(&self) -> &[u8] {
        &self.0.name
    }

    pub fn name(&self) -> &OsStr {
        OsStr::from_bytes(&self.0.name)
    }

    /// Iterates from this node up to (and including) its root.
    pub fn ancestors(&self) -> impl Iterator<Item = &VfsPath> {
        std::iter::successors(Some(self), |p| p.parent())
    }

    /// Number of components below the root.
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// True if both handles point at the very same node.
    pub fn ptr_eq(&self, other: &VfsPath) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Number of live handles to this node (including those held by children).
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// Returns true if `ancestor` contains this path as a child, grandchild, etc.
    pub fn is_ancestor(&self, ancestor: &VfsPath) -> bool {
        self.ancestors().skip(1).any(|p| p == ancestor)
    }

    /// Component names from the topmost non-root node down to this one.
    pub(crate) fn components(&self) -> Vec<&[u8]> {
        let mut names: Vec<&[u8]> = self
            .ancestors()
            .filter(|p| !p.is_root())
            .map(|p| p.name_bytes())
            .collect();
        names.reverse();
        names
    }

    /// Bytes required to render the path string.
    pub fn string_len(&self) -> usize {
        if self.is_root() {
            return 1;
        }
        self.ancestors()
            .filter(|p| !p.is_root())
            .map(|p| p.name_bytes().len() + 1)
            .sum()
    }

    /// Renders the full path into `buffer`, returning the number of bytes written.
    pub fn to_string_buf(&self, buffer: &mut [u8]) -> Result<usize> {
        let needed = self.string_len();
        if buffer.len() < needed {
            return Err(CoreError::name_too_long("path too long to fit into buffer"));
        }

        if self.is_root() {
            buffer[0] = b'/';
            return Ok(1);
        }

        let mut pos = 0;
        for name in self.components() {
            buffer[pos] = b'/';
            pos += 1;
            buffer[pos..pos + name.len()].copy_from_slice(name);
            pos += name.len();
        }
        debug_assert_eq!(pos, needed);
        Ok(pos)
    }

    /// Heap-allocated form of [`VfsPath::to_string_buf`].
    pub fn to_bytes(&self) -> Vec<u8> {
        if self.is_root() {
            return b"/".to_vec();
        }
        let mut out = Vec::with_capacity(self.string_len());
        for name in self.components() {
            out.push(b'/');
            out.extend_from_slice(name);
        }
        out
    }

    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(OsStr::from_bytes(&self.to_bytes()))
    }

    /// Bytes required to render the URI.
    pub fn uri_len(&self) -> usize {
        let components = self.components();
        let separators = components.len().saturating_sub(1);
        self.scheme().uri_prefix().len()
            + separators
            + components.iter().map(|c| uri::escaped_len(c)).sum::<usize>()
    }

    /// Renders the escaped URI into `buffer`, returning the number of bytes written.
    pub fn to_uri_buf(&self, buffer: &mut [u8]) -> Result<usize> {
        let needed = self.uri_len();
        if buffer.len() < needed {
            return Err(CoreError::name_too_long("URI too long to fit into buffer"));
        }

        let prefix = self.scheme().uri_prefix().as_bytes();
        buffer[..prefix.len()].copy_from_slice(prefix);
        let mut pos = prefix.len();
        for (idx, name) in self.components().into_iter().enumerate() {
            if idx > 0 {
                buffer[pos] = b'/';
                pos += 1;
            }
            pos += uri::escape_to_slice(name, &mut buffer[pos..]);
        }
        debug_assert_eq!(pos, needed);
        Ok(pos)
    }

    /// Heap-allocated form of [`VfsPath::to_uri_buf`].
    pub fn to_uri_string(&self) -> String {
        let mut out = String::with_capacity(self.uri_len());
        out.push_str(self.scheme().uri_prefix());
        for (idx, name) in self.components().into_iter().enumerate() {
            if idx > 0 {
                out.push('/');
            }
            uri::escape_into(name, &mut out);
        }
        out
    }

    /// Hash of the scheme tag and the last component only.
    ///
    /// Paths sharing a basename in different directories collide; hash
    /// tables must fall back to [`PartialEq`] which compares the full chain.
    pub fn hash_value(&self) -> u32 {
        let name = self.name_bytes();
        let mut h = u32::from(name[0]);
        for &c in &name[1..] {
            h = (h << 5).wrapping_sub(h).wrapping_add(u32::from(c));
        }
        (h << 5).wrapping_sub(h).wrapping_add(self.scheme().tag())
    }
}

impl PartialEq for VfsPath {
    fn eq(&self, other: &Self) -> bool {
        if self.scheme() != other.scheme() {
            return false;
        }

        let mut a = self;
        let mut b = other;
        loop {
            if a.ptr_eq(b) {
                return true;
            }
            if a.name_bytes() != b.name_bytes() {
                return false;
            }
            match (a.parent(), b.parent()) {
                (Some(pa), Some(pb)) => {
                    a = pa;
                    b = pb;
                }
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl Eq for VfsPath {}

impl Hash for VfsPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.hash_value());
    }
}

impl fmt::Debug for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VfsPath").field(&self.to_uri_string()).finish()
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scheme() {
            PathScheme::File => write!(f, "{}", self.to_path_buf().display()),
            PathScheme::Trash => f.write_str(&self.to_uri_string()),
        }
    }
}

/// Owner of the permanent path nodes.
pub struct PathInterner {
    /// Filesystem root at index 0 down to `$HOME` at the end.
    spine: Box<[VfsPath]>,
    trash_root: VfsPath,
}

impl PathInterner {
    /// Builds the home spine for `home_dir`.
    pub fn new(home_dir: impl AsRef<Path>) -> Self {
        let mut node = VfsPath::new_root(PathScheme::File);
        let mut spine = vec![node.clone()];
        for name in canonical_components(home_dir.as_ref().as_os_str().as_bytes()) {
            node = VfsPath::new_child(&node, &name);
            spine.push(node.clone());
        }

        tracing::debug!(home = ?home_dir.as_ref(), depth = spine.len() - 1, "initialized home spine");

        PathInterner {
            spine: spine.into_boxed_slice(),
            trash_root: VfsPath::new_root(PathScheme::Trash),
        }
    }

    pub fn root(&self) -> VfsPath {
        self.spine[0].clone()
    }

    pub fn home(&self) -> VfsPath {
        self.spine[self.spine.len() - 1].clone()
    }

    pub fn trash_root(&self) -> VfsPath {
        self.trash_root.clone()
    }

    pub fn is_home(&self, path: &VfsPath) -> bool {
        path.ptr_eq(&self.spine[self.spine.len() - 1])
    }

    /// True for nodes that live as long as the interner: the spine and the trash root.
    pub fn is_permanent(&self, path: &VfsPath) -> bool {
        path.ptr_eq(&self.trash_root) || self.spine.iter().any(|p| p.ptr_eq(path))
    }

    /// Parses an absolute local path or a `file:` / `trash:` URI.
    pub fn resolve(&self, identifier: &str) -> Result<VfsPath> {
        if identifier.starts_with('/') {
            return Ok(self.resolve_local(identifier.as_bytes()));
        }

        let (scheme, rest) = identifier
            .split_once(':')
            .ok_or_else(|| CoreError::invalid_uri(format!("{identifier:?} is neither an absolute path nor a URI")))?;

        if scheme.eq_ignore_ascii_case("file") {
            if rest.contains('#') {
                return Err(CoreError::invalid_uri(format!("the local file URI {identifier:?} may not include a '#'")));
            }
            let path = if rest.starts_with("//") {
                strip_authority(rest)
            } else {
                rest.starts_with('/').then_some(rest)
            };
            let path = path.ok_or_else(|| CoreError::invalid_uri(format!("{identifier:?} is not a local file URI")))?;
            let bytes = uri::unescape_path(path)?;
            Ok(self.resolve_local(&bytes))
        } else if scheme.eq_ignore_ascii_case("trash") {
            let path = strip_authority(rest).unwrap_or(rest);
            let bytes = uri::unescape_path(path)?;
            let mut node = self.trash_root();
            for name in canonical_components(&bytes) {
                node = VfsPath::new_child(&node, &name);
            }
            Ok(node)
        } else {
            Err(CoreError::invalid_uri(format!("unsupported URI scheme in {identifier:?}")))
        }
    }

    /// Resolves an absolute local path (relative paths are taken from `/`).
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> VfsPath {
        self.resolve_local(path.as_ref().as_os_str().as_bytes())
    }

    fn resolve_local(&self, filename: &[u8]) -> VfsPath {
        let components = canonical_components(filename);

        // Follow the home spine as far as the components match it.
        let mut matched = 0;
        while matched < components.len()
            && matched + 1 < self.spine.len()
            && self.spine[matched + 1].name_bytes() == components[matched].as_slice()
        {
            matched += 1;
        }

        let mut path = self.spine[matched].clone();
        for name in &components[matched..] {
            path = VfsPath::new_child(&path, name);
        }
        path
    }

    /// Returns the path for `name` directly beneath `parent`.
    ///
    /// If `parent` is a spine node and `name` is the next spine component,
    /// the existing spine node is returned.
    pub fn child(&self, parent: &VfsPath, name: impl AsRef<OsStr>) -> Result<VfsPath> {
        let name = name.as_ref().as_bytes();
        if name.is_empty() || name.contains(&b'/') {
            return Err(CoreError::invalid_uri(format!(
                "{:?} is not a valid path component",
                String::from_utf8_lossy(name)
            )));
        }

        if let Some(n) = self.spine[..self.spine.len() - 1]
            .iter()
            .rposition(|p| p.ptr_eq(parent))
        {
            let next = &self.spine[n + 1];
            if next.name_bytes() == name {
                return Ok(next.clone());
            }
        }

        Ok(VfsPath::new_child(parent, name))
    }

    /// Appends every component of the `/`-separated `relative` path to `parent`.
    ///
    /// An empty string returns `parent` itself.
    pub fn relative(&self, parent: &VfsPath, relative: impl AsRef<OsStr>) -> Result<VfsPath> {
        let mut path = parent.clone();
        for name in relative.as_ref().as_bytes().split(|&c| c == b'/') {
            if !name.is_empty() {
                path = self.child(&path, OsStr::from_bytes(name))?;
            }
        }
        Ok(path)
    }

    /// Splits a `text/uri-list` (RFC 2483), discarding comments and whitespace.
    pub fn parse_uri_list(&self, text: &str) -> Result<Vec<VfsPath>> {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| self.resolve(line))
            .collect()
    }

    /// Number of handles to permanent nodes that are still held outside the interner.
    pub fn outstanding_references(&self) -> usize {
        let last = self.spine.len() - 1;
        let spine: usize = self
            .spine
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                // Every spine node but the last is also held by its spine child.
                let owned = if idx == last { 1 } else { 2 };
                p.strong_count().saturating_sub(owned)
            })
            .sum();
        spine + self.trash_root.strong_count().saturating_sub(1)
    }
}

impl fmt::Debug for PathInterner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathInterner")
            .field("home", &self.home())
            .finish_non_exhaustive()
    }
}

/// Renders `paths` as a `text/uri-list`, one URI per line.
pub fn uri_list_to_string<'a>(paths: impl IntoIterator<Item = &'a VfsPath>) -> String {
    let mut out = String::new();
    for path in paths {
        out.push_str(&path.to_uri_string());
        out.push('\n');
    }
    out
}

/// Strips `//authority` from the part of a URI after the scheme, accepting
/// only an empty authority or `localhost`.
fn strip_authority(rest: &str) -> Option<&str> {
    let after = rest.strip_prefix("//")?;
    let slash = after.find('/')?;
    let (authority, path) = after.split_at(slash);
    (authority.is_empty() || authority.eq_ignore_ascii_case("localhost")).then_some(path)
}
