use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::locale::LocaleSet;
use crate::error::RouteTableError;

const BUILTIN_ROUTES: &str = include_str!("../../config/routes.json");

/// LocalizedPath
///
/// Either one path shared by every locale, or a path per locale code.
/// In JSON this is a plain string or an object keyed by locale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalizedPath {
    Invariant(String),
    PerLocale(BTreeMap<String, String>),
}

impl LocalizedPath {
    pub fn for_locale(&self, locale: &str) -> Option<&str> {
        match self {
            LocalizedPath::Invariant(path) => Some(path.as_str()),
            LocalizedPath::PerLocale(paths) => paths.get(locale).map(String::as_str),
        }
    }
}

/// RouteEntry
///
/// One route key and its localized path(s).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub key: String,
    pub path: LocalizedPath,
}

/// A required permission for every route key starting with `prefix`.
/// `None` or an empty string means a session is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionEntry {
    pub prefix: String,
    #[serde(default)]
    pub permission: Option<String>,
}

/// What a route key demands from the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredAccess {
    Public,
    Authenticated,
    Permission(String),
}

/// LocalizedPathTable
///
/// Route keys in declaration order. Scanning stops at the first key whose path
/// for the resolved locale equals the request path.
#[derive(Debug, Clone)]
pub struct LocalizedPathTable {
    entries: Vec<RouteEntry>,
}

impl LocalizedPathTable {
    /// Rejects duplicate keys and two keys sharing a path within one locale.
    pub fn new(entries: Vec<RouteEntry>, locales: &LocaleSet) -> Result<Self, RouteTableError> {
        let mut keys = HashSet::new();
        for entry in &entries {
            if !keys.insert(entry.key.as_str()) {
                return Err(RouteTableError::DuplicateRouteKey(entry.key.clone()));
            }
        }

        for locale in locales.locales() {
            let mut seen: HashMap<&str, &str> = HashMap::new();
            for entry in &entries {
                let Some(path) = entry.path.for_locale(locale) else {
                    continue;
                };
                if let Some(first) = seen.insert(path, entry.key.as_str()) {
                    return Err(RouteTableError::DuplicateLocalizedPath {
                        locale: locale.clone(),
                        path: path.to_string(),
                        first: first.to_string(),
                        second: entry.key.clone(),
                    });
                }
            }
        }

        Ok(Self { entries })
    }

    /// Route key whose path for `locale` equals `path_without_locale`.
    pub fn resolve(&self, locale: &str, path_without_locale: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.path.for_locale(locale) == Some(path_without_locale))
            .map(|entry| entry.key.as_str())
    }

    /// The localized path of `route_key` under `locale`, when it has one.
    pub fn path_for(&self, route_key: &str, locale: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key == route_key)
            .and_then(|entry| entry.path.for_locale(locale))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// RoutePermissionTable
///
/// Permission entries sorted once by prefix length, longest first, so the first
/// prefix that matches a route key is the most specific one.
#[derive(Debug, Clone)]
pub struct RoutePermissionTable {
    entries: Vec<PermissionEntry>,
}

impl RoutePermissionTable {
    pub fn new(mut entries: Vec<PermissionEntry>) -> Result<Self, RouteTableError> {
        // Distinct prefixes of equal length cannot both prefix one key, so
        // duplicates are the only source of ties.
        let mut prefixes = HashSet::new();
        for entry in &entries {
            if !prefixes.insert(entry.prefix.as_str()) {
                return Err(RouteTableError::DuplicatePermissionPrefix(
                    entry.prefix.clone(),
                ));
            }
        }

        entries.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Ok(Self { entries })
    }

    /// Most specific entry whose prefix starts the route key.
    pub fn lookup(&self, route_key: &str) -> Option<&PermissionEntry> {
        self.entries
            .iter()
            .find(|entry| route_key.starts_with(entry.prefix.as_str()))
    }

    pub fn required_access(&self, route_key: Option<&str>) -> RequiredAccess {
        let Some(entry) = route_key.and_then(|key| self.lookup(key)) else {
            return RequiredAccess::Public;
        };
        match entry.permission.as_deref() {
            Some(permission) if !permission.is_empty() => {
                RequiredAccess::Permission(permission.to_string())
            }
            _ => RequiredAccess::Authenticated,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouteTableFile {
    locales: Vec<String>,
    default_locale: String,
    routes: Vec<RouteEntry>,
    #[serde(default)]
    permissions: Vec<PermissionEntry>,
}

/// RouteTables
///
/// Static routing configuration: supported locales, localized paths and the
/// permission table. Built once at startup and shared read-only.
#[derive(Debug, Clone)]
pub struct RouteTables {
    pub locales: LocaleSet,
    pub paths: LocalizedPathTable,
    pub permissions: RoutePermissionTable,
}

impl RouteTables {
    pub fn new(
        locales: LocaleSet,
        routes: Vec<RouteEntry>,
        permissions: Vec<PermissionEntry>,
    ) -> Result<Self, RouteTableError> {
        let paths = LocalizedPathTable::new(routes, &locales)?;
        let permissions = RoutePermissionTable::new(permissions)?;
        Ok(Self {
            locales,
            paths,
            permissions,
        })
    }

    pub fn from_json(json: &str) -> Result<Self, RouteTableError> {
        let file: RouteTableFile = serde_json::from_str(json)?;
        let locales = LocaleSet::new(file.locales, file.default_locale)?;
        Self::new(locales, file.routes, file.permissions)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RouteTableError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The marketplace route table compiled into the binary.
    pub fn builtin() -> Result<Self, RouteTableError> {
        Self::from_json(BUILTIN_ROUTES)
    }
}
