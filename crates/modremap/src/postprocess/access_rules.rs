use std::collections::BTreeMap;
use std::path::Path;

use super::PostProcessError;
use crate::archive;
use crate::config::AccessRuleMode;
use crate::descriptor;
use crate::mapping::MappingSet;

const LEGACY_SUFFIX: &str = ".at";
const WIDENER_SUFFIX: &str = ".accesswidener";

/// Translate or convert the legacy access-rule resource inside `jar`.
///
/// Returns whether any rule work was performed; a jar without a legacy rule
/// resource is a valid no-op. Rule symbols are expected in the source
/// namespace and are written out in the target namespace either way.
pub fn process_access_rules(
    jar: &Path,
    mode: AccessRuleMode,
    mapping: &MappingSet,
) -> Result<bool, PostProcessError> {
    let Some(entry) = find_legacy_entry(jar)? else {
        return Ok(false);
    };
    let bytes = archive::read_entry(jar, &entry)?.unwrap_or_default();
    let rules = parse_rules(&entry, &String::from_utf8_lossy(&bytes))?;

    let mut changes = BTreeMap::new();
    match mode {
        AccessRuleMode::Obfuscate => {
            let translated = render_legacy(&rules, mapping);
            changes.insert(entry.clone(), Some(translated.into_bytes()));
            archive::patch_entries(jar, changes)?;
        }
        AccessRuleMode::Convert => {
            let widener_entry = entry
                .strip_suffix(LEGACY_SUFFIX)
                .unwrap_or(&entry)
                .to_string()
                + WIDENER_SUFFIX;
            let widener = render_widener(&rules, mapping);
            changes.insert(entry.clone(), None);
            changes.insert(widener_entry.clone(), Some(widener.into_bytes()));
            archive::patch_entries(jar, changes)?;

            // The conversion stands even when the descriptor marker fails.
            if let Err(error) = descriptor::set_access_widener(jar, &widener_entry) {
                tracing::warn!(
                    jar = %jar.display(),
                    error = %error,
                    "failed to note access widener in descriptor"
                );
            } else {
                tracing::debug!(entry = %widener_entry, "noted access widener in descriptor");
            }
        }
    }

    Ok(true)
}

fn find_legacy_entry(jar: &Path) -> Result<Option<String>, PostProcessError> {
    let names = archive::entry_names(jar)?;
    Ok(names
        .into_iter()
        .find(|name| name.ends_with(LEGACY_SUFFIX)))
}

#[derive(Debug, Clone)]
enum RuleLine {
    /// Comments and blank lines, preserved verbatim.
    Verbatim(String),
    Class {
        access: String,
        class: String,
    },
    Member {
        access: String,
        class: String,
        name: String,
        descriptor: String,
    },
}

fn parse_rules(entry: &str, content: &str) -> Result<Vec<RuleLine>, PostProcessError> {
    let mut rules = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            rules.push(RuleLine::Verbatim(line.to_string()));
            continue;
        }
        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        match tokens.as_slice() {
            [access, class] => rules.push(RuleLine::Class {
                access: access.to_string(),
                class: class.to_string(),
            }),
            [access, class, name, descriptor] => rules.push(RuleLine::Member {
                access: access.to_string(),
                class: class.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            }),
            _ => {
                return Err(PostProcessError::MalformedRule {
                    entry: entry.to_string(),
                    line: index + 1,
                    text: line.to_string(),
                })
            }
        }
    }
    Ok(rules)
}

fn map_member<'a>(
    mapping: &'a MappingSet,
    class: &str,
    name: &'a str,
    descriptor: &str,
) -> &'a str {
    if descriptor.starts_with('(') {
        mapping.map_method(class, name, descriptor).unwrap_or(name)
    } else {
        mapping.map_field(class, name, descriptor).unwrap_or(name)
    }
}

fn render_legacy(rules: &[RuleLine], mapping: &MappingSet) -> String {
    let mut out = String::new();
    for rule in rules {
        match rule {
            RuleLine::Verbatim(line) => out.push_str(line),
            RuleLine::Class { access, class } => {
                let mapped = mapping.map_class(class).unwrap_or(class);
                out.push_str(&format!("{access} {mapped}"));
            }
            RuleLine::Member {
                access,
                class,
                name,
                descriptor,
            } => {
                let mapped_name = map_member(mapping, class, name, descriptor);
                let mapped_class = mapping.map_class(class).unwrap_or(class);
                let mapped_descriptor = mapping.map_descriptor(descriptor);
                out.push_str(&format!(
                    "{access} {mapped_class} {mapped_name} {mapped_descriptor}"
                ));
            }
        }
        out.push('\n');
    }
    out
}

fn render_widener(rules: &[RuleLine], mapping: &MappingSet) -> String {
    let mut out = format!("accessWidener\tv1\t{}\n", mapping.target_namespace());
    for rule in rules {
        match rule {
            RuleLine::Verbatim(line) => {
                out.push_str(line);
                out.push('\n');
            }
            RuleLine::Class { access, class } => {
                let mapped = mapping.map_class(class).unwrap_or(class);
                for keyword in widener_keywords(access) {
                    out.push_str(&format!("{keyword}\tclass\t{mapped}\n"));
                }
            }
            RuleLine::Member {
                access,
                class,
                name,
                descriptor,
            } => {
                let kind = if descriptor.starts_with('(') {
                    "method"
                } else {
                    "field"
                };
                let mapped_name = map_member(mapping, class, name, descriptor);
                let mapped_class = mapping.map_class(class).unwrap_or(class);
                let mapped_descriptor = mapping.map_descriptor(descriptor);
                for keyword in widener_keywords(access) {
                    out.push_str(&format!(
                        "{keyword}\t{kind}\t{mapped_class}\t{mapped_name}\t{mapped_descriptor}\n"
                    ));
                }
            }
        }
    }
    out
}

/// Legacy `public` becomes `accessible`; a `-f` suffix (final stripped)
/// additionally widens to `extendable`.
fn widener_keywords(access: &str) -> Vec<&'static str> {
    if access.ends_with("-f") {
        vec!["accessible", "extendable"]
    } else {
        vec!["accessible"]
    }
}
