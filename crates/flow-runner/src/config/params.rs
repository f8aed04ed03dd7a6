//! `${name}` placeholders.
//!
//! A flow sees two rounds of substitution. At load time, `-P` values and the
//! file's `params:` definitions fill what they can and leave every other
//! placeholder in place. At run time the remaining placeholders are filled
//! from values captured earlier in the run (`${otp}`), and anything still
//! unknown is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Named string values: CLI parameters or run-time variables.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<String, String>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Params::insert`].
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse `-P key=value` arguments. The value may itself contain `=`.
    pub fn from_args(args: &[String]) -> Result<Self> {
        args.iter().try_fold(Self::new(), |params, arg| {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                Error::Config(format!("invalid param '{}', expected key=value", arg))
            })?;
            if key.is_empty() {
                return Err(Error::Config(format!("invalid param '{}', empty key", arg)));
            }
            Ok(params.set(key, value))
        })
    }
}

/// Entry under a flow's `params:` key.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamDef {
    #[serde(default)]
    pub required: bool,

    pub default: Option<String>,

    /// Shown by `flow-runner --check`.
    pub description: Option<String>,
}

/// What to do with a placeholder nothing can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unresolved {
    Keep,
    Reject,
}

/// Load-time substitution. Unknown names are kept for the run.
pub fn substitute(
    template: &str,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<String> {
    expand(template, Unresolved::Keep, |name| {
        if let Some(v) = params.get(name) {
            return Ok(Some(v.to_string()));
        }
        match defs.get(name) {
            Some(ParamDef {
                default: Some(default),
                ..
            }) => Ok(Some(default.clone())),
            Some(def) if def.required => Err(Error::Config(format!(
                "missing required parameter: {}",
                name
            ))),
            Some(_) => Ok(Some(String::new())),
            None => Ok(None),
        }
    })
}

/// Run-time substitution from captured variables. Every placeholder must
/// resolve.
pub fn substitute_vars(template: &str, vars: &Params) -> Result<String> {
    expand(template, Unresolved::Reject, |name| {
        Ok(vars.get(name).map(str::to_string))
    })
}

/// Single left-to-right pass; substituted values are not scanned again.
fn expand(
    template: &str,
    unresolved: Unresolved,
    mut lookup: impl FnMut(&str) -> Result<Option<String>>,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("${") {
        let Some(close) = rest[open..].find('}').map(|i| open + i) else {
            break;
        };
        let name = &rest[open + 2..close];
        out.push_str(&rest[..open]);
        match lookup(name)? {
            Some(value) => out.push_str(&value),
            None if unresolved == Unresolved::Keep => out.push_str(&rest[open..=close]),
            None => return Err(Error::Config(format!("unresolved variable: {}", name))),
        }
        rest = &rest[close + 1..];
    }

    out.push_str(rest);
    Ok(out)
}

/// Load-time substitution over every string in a YAML document.
pub fn substitute_value(
    value: &mut serde_yaml::Value,
    params: &Params,
    defs: &HashMap<String, ParamDef>,
) -> Result<()> {
    match value {
        serde_yaml::Value::String(s) => *s = substitute(s, params, defs)?,
        serde_yaml::Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        serde_yaml::Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, params, defs)?;
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(entries: &[(&str, bool, Option<&str>)]) -> HashMap<String, ParamDef> {
        entries
            .iter()
            .map(|(name, required, default)| {
                (
                    name.to_string(),
                    ParamDef {
                        required: *required,
                        default: default.map(str::to_string),
                        description: None,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn load_time_fills_params_then_defaults() {
        let params = Params::new().set("password", "pw");
        let defs = defs(&[
            ("email", false, Some("wastenot-user-automation@mailnesia.com")),
            ("password", true, None),
            ("note", false, None),
        ]);
        let result = substitute("${email} / ${password} / [${note}]", &params, &defs).unwrap();
        assert_eq!(result, "wastenot-user-automation@mailnesia.com / pw / []");
    }

    #[test]
    fn load_time_missing_required_param() {
        let defs = defs(&[("password", true, None)]);
        let err = substitute("${password}", &Params::new(), &defs).unwrap_err();
        assert!(err.to_string().contains("missing required parameter: password"));
    }

    #[test]
    fn load_time_keeps_runtime_placeholders() {
        let params = Params::new().set("email", "qa@mailnesia.com");
        let result = substitute("${email} / ${otp}", &params, &HashMap::new()).unwrap();
        assert_eq!(result, "qa@mailnesia.com / ${otp}");
    }

    #[test]
    fn runtime_fills_captured_values() {
        let vars = Params::new().set("otp", "0099");
        assert_eq!(substitute_vars("code ${otp}.", &vars).unwrap(), "code 0099.");
        assert_eq!(substitute_vars("no vars", &vars).unwrap(), "no vars");
    }

    #[test]
    fn runtime_rejects_unknown_names() {
        let vars = Params::new().set("otp", "0099");
        let err = substitute_vars("${otp} ${token}", &vars).unwrap_err();
        assert!(err.to_string().contains("unresolved variable: token"), "{}", err);
    }

    #[test]
    fn values_are_not_rescanned() {
        let vars = Params::new().set("a", "${b}").set("b", "x");
        assert_eq!(substitute_vars("${a}", &vars).unwrap(), "${b}");
    }

    #[test]
    fn unterminated_placeholder_is_literal() {
        let vars = Params::new();
        assert_eq!(substitute_vars("cost ${5", &vars).unwrap(), "cost ${5");
    }

    #[test]
    fn substitute_value_walks_nested_yaml() {
        let mut doc: serde_yaml::Value =
            serde_yaml::from_str("actions:\n  - fill:\n      value: \"${email}\"\n  - fill:\n      value: \"${otp}\"\n")
                .unwrap();
        let params = Params::new().set("email", "qa@mailnesia.com");
        substitute_value(&mut doc, &params, &HashMap::new()).unwrap();
        assert_eq!(doc["actions"][0]["fill"]["value"], "qa@mailnesia.com");
        assert_eq!(doc["actions"][1]["fill"]["value"], "${otp}");
    }

    #[test]
    fn params_from_args() {
        let args = vec![
            "email=qa@mailnesia.com".to_string(),
            "password=Testing=1".to_string(),
        ];
        let params = Params::from_args(&args).unwrap();
        assert_eq!(params.get("email"), Some("qa@mailnesia.com"));
        assert_eq!(params.get("password"), Some("Testing=1"));
    }

    #[test]
    fn params_from_args_rejects_bad_pairs() {
        for arg in ["password", "=value"] {
            let err = Params::from_args(&[arg.to_string()]).unwrap_err();
            assert!(err.to_string().contains("invalid param"), "{}", err);
        }
    }
}
