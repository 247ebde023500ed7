//! Process-wide keyword tables used for goal and sub-goal classification.
//!
//! Tables are compiled once on first use and never mutated afterwards. Every
//! category compiles to a single case-insensitive, word-bounded alternation so
//! lookups are a single regex scan.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Category of keyword phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeywordCategory {
    /// Requests for a quick, shallow run.
    Fast,
    /// Requests for an exhaustive run.
    Thorough,
    /// Restricts content sources to Wikipedia (images disallowed).
    OnlyWikipedia,
    /// Restricts content sources to images (Wikipedia disallowed).
    OnlyImages,
    Wikipedia,
    Images,
    /// The document coordination portal.
    Cae,
    UploadVerb,
    DocumentNoun,
}

const FAST: &[&str] = &[
    "rápido",
    "rapido",
    "rápida",
    "rapida",
    "rápidamente",
    "rapidamente",
    "fast",
    "quick",
    "quickly",
    "sin profundizar",
];

const THOROUGH: &[&str] = &[
    "exhaustivo",
    "exhaustiva",
    "a fondo",
    "en profundidad",
    "detallado",
    "detallada",
    "thorough",
    "thoroughly",
    "in depth",
    "in-depth",
];

const ONLY_WIKIPEDIA: &[&str] = &[
    "solo wikipedia",
    "sólo wikipedia",
    "solamente wikipedia",
    "únicamente wikipedia",
    "unicamente wikipedia",
    "only wikipedia",
    "wikipedia only",
    "sin imágenes",
    "sin imagenes",
    "no images",
    "without images",
];

const ONLY_IMAGES: &[&str] = &[
    "solo imágenes",
    "solo imagenes",
    "sólo imágenes",
    "sólo imagenes",
    "only images",
    "images only",
    "sin wikipedia",
    "no wikipedia",
    "without wikipedia",
];

const WIKIPEDIA: &[&str] = &[
    "wikipedia",
    "wiki",
    "enciclopedia",
    "encyclopedia",
    "biografía",
    "biografia",
    "biography",
];

const IMAGES: &[&str] = &[
    "imagen",
    "imágenes",
    "imagenes",
    "foto",
    "fotos",
    "fotografía",
    "fotografías",
    "image",
    "images",
    "picture",
    "pictures",
    "photo",
    "photos",
];

const CAE: &[&str] = &[
    "cae",
    "portal",
    "plataforma cae",
    "coordinación de actividades",
    "coordinacion de actividades",
    "documentación pendiente",
    "documentacion pendiente",
    "pending documents",
    "trabajador",
    "trabajadores",
    "worker",
];

const UPLOAD_VERB: &[&str] = &[
    "sube",
    "subir",
    "súbelo",
    "subelo",
    "envía",
    "envia",
    "enviar",
    "adjunta",
    "adjuntar",
    "carga",
    "cargar",
    "upload",
    "send",
    "attach",
];

const DOCUMENT_NOUN: &[&str] = &[
    "documento",
    "documentos",
    "documentación",
    "documentacion",
    "archivo",
    "archivos",
    "fichero",
    "certificado",
    "contrato",
    "dni",
    "pdf",
    "document",
    "documents",
    "file",
    "files",
    "certificate",
    "contract",
];

/// Known document types, in match priority order.
pub const DOCUMENT_TYPES: &[&str] = &[
    "reconocimiento médico",
    "reconocimiento medico",
    "formación",
    "formacion",
    "certificado",
    "contrato",
    "seguro",
    "dni",
    "epi",
];

fn compile(phrases: &[&str]) -> Regex {
    let alternation = phrases
        .iter()
        .map(|phrase| regex::escape(phrase))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("keyword table regex should be valid")
}

/// Immutable keyword tables keyed by category.
#[derive(Debug)]
pub struct KeywordTables {
    patterns: HashMap<KeywordCategory, Regex>,
    step_cap: Regex,
    document_type: Regex,
}

static TABLES: LazyLock<KeywordTables> = LazyLock::new(KeywordTables::build);

impl KeywordTables {
    /// Shared tables for the whole process.
    pub fn global() -> &'static KeywordTables {
        &TABLES
    }

    fn build() -> Self {
        let entries = [
            (KeywordCategory::Fast, FAST),
            (KeywordCategory::Thorough, THOROUGH),
            (KeywordCategory::OnlyWikipedia, ONLY_WIKIPEDIA),
            (KeywordCategory::OnlyImages, ONLY_IMAGES),
            (KeywordCategory::Wikipedia, WIKIPEDIA),
            (KeywordCategory::Images, IMAGES),
            (KeywordCategory::Cae, CAE),
            (KeywordCategory::UploadVerb, UPLOAD_VERB),
            (KeywordCategory::DocumentNoun, DOCUMENT_NOUN),
        ];
        let patterns = entries
            .into_iter()
            .map(|(category, phrases)| (category, compile(phrases)))
            .collect();
        let step_cap = Regex::new(
            r"(?i)\b(?:máx(?:imo)?|max(?:imo|imum)?)\.?\s*(?:de\s+|of\s+)?([0-9]+)\s*(?:pasos|paso|steps|step)\b",
        )
        .expect("step cap regex should be valid");
        Self {
            patterns,
            step_cap,
            document_type: compile(DOCUMENT_TYPES),
        }
    }

    /// True if `text` contains any phrase of `category`.
    pub fn matches(&self, category: KeywordCategory, text: &str) -> bool {
        self.patterns
            .get(&category)
            .is_some_and(|pattern| pattern.is_match(text))
    }

    /// Explicit step count phrase (`máx 3 pasos`, `max 5 steps`), unclamped.
    /// Counts too long for a `u64` saturate instead of being ignored.
    pub fn step_cap(&self, text: &str) -> Option<u64> {
        let digits = self.step_cap.captures(text)?.get(1)?;
        Some(digits.as_str().bytes().fold(0u64, |count, digit| {
            count
                .saturating_mul(10)
                .saturating_add(u64::from(digit - b'0'))
        }))
    }

    /// First known document type mentioned in `text`, lowercased.
    pub fn document_type(&self, text: &str) -> Option<String> {
        self.document_type
            .find(text)
            .map(|found| found.as_str().to_lowercase())
    }
}
