//! Localization references carried alongside field names.
//!
//! A field name can be accompanied by a chain of string IDs pointing into
//! language modules, so a reader can localize the name without the device
//! shipping every translation. The wire encoding is
//! `id[|module[|seed]]` steps joined by commas, where an empty module
//! position (`id||seed`) inherits the field's language module.

/// One step in the localization chain of a field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizationStep {
    pub string_id: i32,
    /// Language module the string ID points into, when different from the
    /// field's own module.
    pub module: Option<String>,
    /// Default string used to create the localized entry if none exists yet.
    pub seed: Option<String>,
}

impl LocalizationStep {
    pub fn new(string_id: i32) -> Self {
        LocalizationStep {
            string_id,
            module: None,
            seed: None,
        }
    }

    pub fn with_module(
        string_id: i32,
        module: impl Into<String>,
    ) -> Self {
        LocalizationStep {
            string_id,
            module: Some(module.into()),
            seed: None,
        }
    }

    pub fn with_seed(
        string_id: i32,
        module: Option<String>,
        seed: impl Into<String>,
    ) -> Self {
        LocalizationStep {
            string_id,
            module,
            seed: Some(seed.into()),
        }
    }
}

/// Serializes localization steps into the `stringIds` attribute value.
/// Returns `None` when there are no steps.
pub fn format_string_ids(steps: &[LocalizationStep]) -> Option<String> {
    if steps.is_empty() {
        return None;
    }

    let mut out = String::new();
    for step in steps {
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(&step.string_id.to_string());

        if let Some(seed) = &step.seed {
            out.push('|');
            if let Some(module) = &step.module {
                out.push_str(module);
            }
            out.push('|');
            out.push_str(seed);
        } else if let Some(module) = &step.module {
            out.push('|');
            out.push_str(module);
        }
    }
    Some(out)
}

/// Parses a `stringIds` attribute value. Steps that do not begin with an
/// integer ID are skipped, mirroring a lenient reader.
pub fn parse_string_ids(s: &str) -> Vec<LocalizationStep> {
    let mut steps = Vec::new();
    if s.is_empty() {
        return steps;
    }

    for part in s.split(',') {
        let mut sub = part.split('|');
        let id = match sub.next().and_then(|v| v.parse::<i32>().ok()) {
            Some(id) => id,
            None => continue,
        };
        let module = sub.next().filter(|m| !m.is_empty()).map(str::to_owned);
        let seed = sub.next().filter(|m| !m.is_empty()).map(str::to_owned);
        steps.push(LocalizationStep {
            string_id: id,
            module,
            seed,
        });
    }
    steps
}

/// A field name is localizable when it carries at least one step and no
/// step has the reserved ID 0.
pub fn is_localizable(steps: &[LocalizationStep]) -> bool {
    !steps.is_empty() && steps.iter().all(|s| s.string_id != 0)
}
