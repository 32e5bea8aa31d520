use crate::core::models::SourceSpec;
use crate::error::UnknownTargetError;

pub const ALL_TARGETS: &str = "all";

/// Resolve one target name. `all` selects every source in declared order.
pub fn resolve(sources: &[SourceSpec], name: &str) -> Result<Vec<SourceSpec>, UnknownTargetError> {
    if name == ALL_TARGETS {
        return Ok(sources.to_vec());
    }

    sources
        .iter()
        .find(|s| s.name == name)
        .map(|s| vec![s.clone()])
        .ok_or_else(|| UnknownTargetError {
            name: name.to_string(),
            available: sources.iter().map(|s| s.name.clone()).collect(),
        })
}

/// Targets selected by a set of requested names.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Selected sources, in configuration order, each at most once.
    pub targets: Vec<SourceSpec>,
    pub unknown: Vec<UnknownTargetError>,
}

/// Resolve every requested name, keeping the valid ones when some are unknown.
pub fn resolve_many<S: AsRef<str>>(sources: &[SourceSpec], names: &[S]) -> Resolution {
    let mut selected = vec![false; sources.len()];
    let mut unknown = Vec::new();

    for name in names {
        match resolve(sources, name.as_ref()) {
            Ok(specs) => {
                for spec in specs {
                    if let Some(idx) = sources.iter().position(|s| s.name == spec.name) {
                        selected[idx] = true;
                    }
                }
            }
            Err(e) => unknown.push(e),
        }
    }

    let targets = sources
        .iter()
        .zip(selected)
        .filter_map(|(s, keep)| keep.then(|| s.clone()))
        .collect();

    Resolution { targets, unknown }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<SourceSpec> {
        vec![
            SourceSpec::new("home", "/home/pi"),
            SourceSpec::new("etc", "/etc"),
            SourceSpec::new("music", "/srv/music"),
        ]
    }

    fn names(specs: &[SourceSpec]) -> Vec<&str> {
        specs.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn all_returns_every_source_in_order() {
        let specs = resolve(&sources(), "all").unwrap();
        assert_eq!(names(&specs), vec!["home", "etc", "music"]);
    }

    #[test]
    fn single_name_resolves() {
        let specs = resolve(&sources(), "etc").unwrap();
        assert_eq!(names(&specs), vec!["etc"]);
    }

    #[test]
    fn unknown_name_fails_and_lists_available() {
        let err = resolve(&sources(), "photos").unwrap_err();
        assert_eq!(err.name, "photos");
        assert_eq!(err.available, vec!["home", "etc", "music"]);
        assert!(err.to_string().contains("photos"));
    }

    #[test]
    fn unknown_name_fails_even_with_empty_config() {
        assert!(resolve(&[], "home").is_err());
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!(resolve(&sources(), "HOME").is_err());
    }

    #[test]
    fn many_keeps_configuration_order_and_dedups() {
        let res = resolve_many(&sources(), &["music", "home", "music"]);
        assert_eq!(names(&res.targets), vec!["home", "music"]);
        assert!(res.unknown.is_empty());
    }

    #[test]
    fn many_with_all_and_name_returns_each_once() {
        let res = resolve_many(&sources(), &["etc", "all"]);
        assert_eq!(names(&res.targets), vec!["home", "etc", "music"]);
    }

    #[test]
    fn many_reports_unknown_but_keeps_valid() {
        let res = resolve_many(&sources(), &["bogus", "etc"]);
        assert_eq!(names(&res.targets), vec!["etc"]);
        assert_eq!(res.unknown.len(), 1);
        assert_eq!(res.unknown[0].name, "bogus");
    }
}
