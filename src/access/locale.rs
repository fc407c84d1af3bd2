use crate::error::RouteTableError;

/// LocaleSet
///
/// The ordered set of supported locale codes and the default among them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleSet {
    locales: Vec<String>,
    default_locale: String,
}

/// A request path split into its locale and the locale-independent remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedRequestPath {
    /// Locale taken from the path prefix, or the default locale when absent.
    pub locale: String,
    /// Path with the `/{locale}` prefix and any trailing `/` removed; `/` when nothing remains.
    pub path_without_locale: String,
    pub has_prefix: bool,
}

impl LocaleSet {
    pub fn new(
        locales: Vec<String>,
        default_locale: impl Into<String>,
    ) -> Result<Self, RouteTableError> {
        let default_locale = default_locale.into();
        if locales.is_empty() {
            return Err(RouteTableError::EmptyLocales);
        }
        if !locales.contains(&default_locale) {
            return Err(RouteTableError::UnknownDefaultLocale(default_locale));
        }
        Ok(Self {
            locales,
            default_locale,
        })
    }

    pub fn locales(&self) -> &[String] {
        &self.locales
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn contains(&self, locale: &str) -> bool {
        self.locales.iter().any(|l| l == locale)
    }

    /// Returns the candidate when it is supported, the default locale otherwise.
    pub fn normalize<'a>(&'a self, candidate: Option<&'a str>) -> &'a str {
        match candidate {
            Some(locale) if self.contains(locale) => locale,
            _ => &self.default_locale,
        }
    }

    /// strip
    ///
    /// Removes a leading `/{locale}` segment when it names a supported locale.
    /// The match is anchored at the start and must cover a whole segment, so
    /// `/english` is not read as `en`. One trailing `/` is dropped, so
    /// `/en/dashboard/admin/` resolves like `/en/dashboard/admin`.
    pub fn strip(&self, pathname: &str) -> LocalizedRequestPath {
        let rest = pathname.strip_prefix('/').unwrap_or(pathname);
        let (first, remainder) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };

        if self.contains(first) {
            LocalizedRequestPath {
                locale: first.to_string(),
                path_without_locale: non_empty_path(remainder),
                has_prefix: true,
            }
        } else {
            LocalizedRequestPath {
                locale: self.default_locale.clone(),
                path_without_locale: non_empty_path(pathname),
                has_prefix: false,
            }
        }
    }
}

impl LocalizedRequestPath {
    /// The same page under another locale prefix: `/fr/browse`, or `/fr` for the root.
    pub fn with_locale(&self, locale: &str) -> String {
        prefixed(locale, &self.path_without_locale)
    }
}

/// `/{locale}{path}`, with the root collapsing to `/{locale}`.
pub fn prefixed(locale: &str, path: &str) -> String {
    if path == "/" {
        format!("/{}", locale)
    } else {
        format!("/{}{}", locale, path)
    }
}

fn non_empty_path(path: &str) -> String {
    let path = path.strip_suffix('/').unwrap_or(path);
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}
