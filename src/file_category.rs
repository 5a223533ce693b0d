//! File categorization for the organized tree.
//!
//! Maps file extensions (and, as a second opinion, sniffed MIME types) to a
//! closed set of categories. The extension table is plain data: it comes from
//! the `[organization.categories]` configuration table, or from the built-in
//! defaults when none is configured.
//!
//! # Examples
//!
//! ```
//! use smartsort::file_category::{Category, FileMapper};
//!
//! let mapper = FileMapper::default();
//! assert_eq!(mapper.extension_to_category("pdf"), Some(Category::Documents));
//! assert_eq!(mapper.mime_to_category("image/png"), Some(Category::Images));
//! assert_eq!(mapper.categorize(None, Some("xyz")), Category::Others);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// A category folder under `organized/`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Document files (PDF, DOCX, TXT, etc.)
    Documents,
    /// Image files (PNG, JPG, GIF, etc.)
    Images,
    /// Video files (MP4, MKV, AVI, etc.)
    Videos,
    /// Audio files (MP3, WAV, FLAC, etc.)
    Audio,
    /// Archive files (ZIP, RAR, 7Z, etc.)
    Archives,
    /// Code/Source files (Rust, Python, JavaScript, etc.)
    Code,
    /// Spreadsheet files (XLSX, CSV, ODS, etc.)
    Spreadsheets,
    /// Presentation files (PPTX, ODP, etc.)
    Presentations,
    /// Font files (TTF, OTF, WOFF, etc.)
    Fonts,
    /// Everything that matched nothing else
    Others,
}

impl Category {
    /// Every category, `Others` last.
    pub const ALL: [Category; 10] = [
        Category::Documents,
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Archives,
        Category::Code,
        Category::Spreadsheets,
        Category::Presentations,
        Category::Fonts,
        Category::Others,
    ];

    /// Returns the directory name for this category.
    ///
    /// ```
    /// use smartsort::file_category::Category;
    ///
    /// assert_eq!(Category::Images.dir_name(), "images");
    /// assert_eq!(Category::Others.dir_name(), "others");
    /// ```
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::Documents => "documents",
            Category::Images => "images",
            Category::Videos => "videos",
            Category::Audio => "audio",
            Category::Archives => "archives",
            Category::Code => "code",
            Category::Spreadsheets => "spreadsheets",
            Category::Presentations => "presentations",
            Category::Fonts => "fonts",
            Category::Others => "others",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Error returned when a string names no known category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown category '{0}'")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Accepts the directory name or its singular form, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        let category = match normalized.as_str() {
            "documents" | "document" | "docs" => Category::Documents,
            "images" | "image" | "photos" | "pictures" => Category::Images,
            "videos" | "video" => Category::Videos,
            "audio" | "music" => Category::Audio,
            "archives" | "archive" => Category::Archives,
            "code" | "source" => Category::Code,
            "spreadsheets" | "spreadsheet" => Category::Spreadsheets,
            "presentations" | "presentation" => Category::Presentations,
            "fonts" | "font" => Category::Fonts,
            "others" | "other" => Category::Others,
            _ => return Err(UnknownCategory(s.to_string())),
        };
        Ok(category)
    }
}

/// Maps MIME types and file extensions to configured categories.
///
/// Only categories in the configured set are ever returned; anything else
/// resolves to [`Category::Others`].
#[derive(Debug, Clone)]
pub struct FileMapper {
    mime_map: HashMap<String, Category>,
    extension_map: HashMap<String, Category>,
    configured: BTreeSet<Category>,
}

impl FileMapper {
    /// Creates a mapper with the built-in extension and MIME tables.
    pub fn new() -> Self {
        let mut mapper = Self::empty();
        mapper.populate_standard_extensions();
        mapper.populate_standard_mimes();
        mapper.configured = Category::ALL.into_iter().collect();
        mapper
    }

    /// Creates a mapper from a configured `category -> extensions` table.
    ///
    /// An empty table means "use the defaults". MIME sniffing still applies,
    /// restricted to the configured categories.
    pub fn from_table(table: &BTreeMap<Category, Vec<String>>) -> Self {
        if table.is_empty() {
            return Self::new();
        }

        let mut mapper = Self::empty();
        mapper.populate_standard_mimes();
        for (category, extensions) in table {
            mapper.configured.insert(*category);
            for ext in extensions {
                mapper.add_extension_mapping(ext, *category);
            }
        }
        mapper.configured.insert(Category::Others);
        mapper
    }

    fn empty() -> Self {
        Self {
            mime_map: HashMap::new(),
            extension_map: HashMap::new(),
            configured: BTreeSet::new(),
        }
    }

    fn populate_standard_extensions(&mut self) {
        let table: &[(Category, &[&str])] = &[
            (
                Category::Images,
                &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "tiff", "ico", "heic"],
            ),
            (Category::Audio, &["mp3", "wav", "ogg", "flac", "aac", "m4a", "wma"]),
            (
                Category::Videos,
                &["mp4", "mkv", "avi", "mov", "flv", "wmv", "webm", "3gp"],
            ),
            (
                Category::Documents,
                &["pdf", "txt", "doc", "docx", "html", "htm", "md", "rtf", "odt"],
            ),
            (Category::Archives, &["zip", "rar", "7z", "tar", "gz", "bz2", "xz"]),
            (
                Category::Code,
                &[
                    "py", "java", "c", "cpp", "h", "hpp", "js", "ts", "rs", "go", "sh", "bash",
                    "json", "xml", "yaml", "yml", "toml", "css",
                ],
            ),
            (Category::Spreadsheets, &["csv", "xls", "xlsx", "ods"]),
            (Category::Presentations, &["ppt", "pptx", "odp"]),
            (Category::Fonts, &["ttf", "otf", "woff", "woff2"]),
        ];

        for (category, extensions) in table {
            for ext in *extensions {
                self.add_extension_mapping(ext, *category);
            }
        }
    }

    // Limited to the types `infer` can actually sniff from magic bytes.
    fn populate_standard_mimes(&mut self) {
        let table: &[(Category, &[&str])] = &[
            (
                Category::Images,
                &[
                    "image/png", "image/jpeg", "image/gif", "image/webp", "image/bmp",
                    "image/tiff", "image/heif", "image/x-icon",
                ],
            ),
            (
                Category::Audio,
                &["audio/mpeg", "audio/x-wav", "audio/ogg", "audio/x-flac", "audio/aac", "audio/m4a"],
            ),
            (
                Category::Videos,
                &[
                    "video/mp4", "video/quicktime", "video/x-msvideo", "video/x-matroska",
                    "video/webm", "video/x-flv",
                ],
            ),
            (Category::Documents, &["application/pdf", "application/rtf", "application/msword"]),
            (
                Category::Archives,
                &[
                    "application/zip", "application/vnd.rar", "application/x-7z-compressed",
                    "application/x-tar", "application/gzip", "application/x-bzip2",
                    "application/x-xz",
                ],
            ),
            (
                Category::Spreadsheets,
                &[
                    "application/vnd.ms-excel",
                    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
                ],
            ),
            (
                Category::Presentations,
                &[
                    "application/vnd.ms-powerpoint",
                    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
                ],
            ),
            (Category::Fonts, &["font/ttf", "font/otf", "font/woff", "font/woff2"]),
        ];

        for (category, mimes) in table {
            for mime in *mimes {
                self.add_mime_mapping(mime, *category);
            }
        }
    }

    /// Adds a MIME type to category mapping.
    pub fn add_mime_mapping(&mut self, mime: &str, category: Category) {
        self.mime_map.insert(mime.to_lowercase(), category);
    }

    /// Adds a file extension to category mapping. A leading dot is ignored.
    pub fn add_extension_mapping(&mut self, ext: &str, category: Category) {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() {
            self.extension_map.insert(ext, category);
        }
    }

    /// Whether `category` is part of the configured category set.
    pub fn is_configured(&self, category: Category) -> bool {
        self.configured.contains(&category)
    }

    /// The configured categories in their canonical order.
    pub fn configured(&self) -> impl Iterator<Item = Category> + '_ {
        self.configured.iter().copied()
    }

    /// Maps a MIME type to a configured category.
    pub fn mime_to_category(&self, mime_type: &str) -> Option<Category> {
        self.mime_map
            .get(&mime_type.to_lowercase())
            .copied()
            .filter(|category| self.is_configured(*category))
    }

    /// Maps a file extension (with or without the dot) to a configured category.
    pub fn extension_to_category(&self, ext: &str) -> Option<Category> {
        self.extension_map
            .get(&ext.trim_start_matches('.').to_lowercase())
            .copied()
            .filter(|category| self.is_configured(*category))
    }

    /// Rule-based category for a file: extension first, then the sniffed MIME
    /// type, then [`Category::Others`].
    pub fn categorize(&self, mime_type: Option<&str>, ext: Option<&str>) -> Category {
        if let Some(extension) = ext
            && let Some(category) = self.extension_to_category(extension)
        {
            return category;
        }

        if let Some(mime) = mime_type
            && let Some(category) = self.mime_to_category(mime)
        {
            return category;
        }

        Category::Others
    }
}

impl Default for FileMapper {
    fn default() -> Self {
        Self::new()
    }
}
