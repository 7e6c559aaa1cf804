//! Category catalog: the closed set of corpus categories with the
//! human-authored scope descriptions used for zero-shot query routing.

use std::{collections::BTreeMap, path::Path};

use crate::error::Result;

/// Labels and their scope descriptions. The set is small and closed; a
/// `BTreeMap` keeps iteration deterministic.
#[derive(Debug, Clone)]
pub struct CategoryCatalog {
    descriptions: BTreeMap<String, String>,
}

impl CategoryCatalog {
    /// The corpus taxonomy shipped with the engine.
    pub fn builtin() -> Self {
        let pairs: &[(&str, &str)] = &[
            (
                "Zihin_Felsefesi",
                "Bilinç, qualia, yapay zeka, benlik, fizikalizm, dualizm, zihin-beden problemi, psikoloji felsefesi.",
            ),
            (
                "Din_Felsefesi",
                "Tanrı'nın varlığı, ateizm, teizm, deizm, kötülük problemi, inanç, din dili, mucizeler, teoloji.",
            ),
            (
                "Etik",
                "Ahlak, iyi ve kötü, erdem, faydacılık, deontoloji, meta-etik, uygulamalı etik, kürtaj, ötanazi, hayvan hakları.",
            ),
            (
                "Epistemoloji",
                "Bilgi felsefesi, inanç, gerekçelendirme, şüphecilik, doğruluk, algı, bilgi kaynakları, gettier problemi.",
            ),
            (
                "Metafizik",
                "Varlık, töz, zaman, mekan, özgür irade, determinizm, nedensellik, mümkün dünyalar, ontoloji.",
            ),
            (
                "Siyaset_Felsefesi",
                "Devlet, adalet, özgürlük, haklar, liberalizm, sosyalizm, demokrasi, toplumsal sözleşme, otorite.",
            ),
            (
                "Bilim_Felsefesi",
                "Bilimsel yöntem, paradigma, yanlışlanabilirlik, bilimsel gerçekçilik, sözde bilim, doğa yasaları.",
            ),
            (
                "Sanat_Felsefesi",
                "Estetik, güzellik, sanatın tanımı, beğeni yargıları, sanat eleştirisi.",
            ),
            (
                "Hukuk_Felsefesi",
                "Yasa, adalet, ceza, hukuk devleti, doğal hukuk, hukuki pozitivizm.",
            ),
            (
                "İyi_Oluş_&_Hayatın_Anlamı",
                "Mutluluk, yaşamın anlamı, ölüm, eudaimonia, yaşam sanatı, varoluşsal sorunlar.",
            ),
            (
                "Mantık",
                "Akıl yürütme, safsatalar, sembolik mantık, önermeler, çıkarım kuralları, paradokslar.",
            ),
            (
                "Felsefe_Tarihi",
                "Antik felsefe, modern felsefe, filozoflar tarihi, felsefi akımların gelişimi.",
            ),
        ];

        Self {
            descriptions: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Load a replacement taxonomy from a JSON object of
    /// `label -> description`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let descriptions: BTreeMap<String, String> =
            serde_json::from_str(&raw)?;
        Ok(Self { descriptions })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.descriptions.contains_key(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.descriptions
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.descriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptions.is_empty()
    }
}

impl Default for CategoryCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_populated() {
        let catalog = CategoryCatalog::builtin();
        assert_eq!(catalog.len(), 12);
        assert!(catalog.contains("Etik"));
        assert!(catalog.contains("Zihin_Felsefesi"));
        assert!(!catalog.contains("etik"), "labels are case-sensitive");
    }

    #[test]
    fn from_json_file_replaces_taxonomy() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("categories.json");
        std::fs::write(
            &path,
            r#"{"Tarih": "Osmanlı ve dünya tarihi üzerine yazılar."}"#,
        )
        .unwrap();

        let catalog = CategoryCatalog::from_json_file(&path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains("Tarih"));
        assert!(!catalog.contains("Etik"));
    }
}
