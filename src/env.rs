//! Environment requirements of modules.
//!
//! # Overview
//!
//! ```text
//! register(descriptor)
//!     └── normalize(module, declarations)      -> Vec<EnvRequirement>
//!             (type checks, defaults for show_value / valid)
//!
//! init()
//!     └── check_environment(modules, env)      -> Vec<String> (violations)
//!             (default substitution, presence, 'valid' predicate)
//!     └── env_report(modules, env)             -> Vec<String> (info lines)
//! ```
//!
//! Declarations can be built in code with [`EnvDeclaration::new`] or read from
//! YAML with [`EnvDeclaration::list_from_yaml`]. YAML is loosely typed, so the
//! raw declaration keeps `serde_yaml::Value`s and every type check happens
//! once, in [`normalize`], when the owning module is registered.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_yaml::{Number, Value as YamlValue};
use stagehand_common::{Error, Result};

use crate::logging::Logger;

/// Placeholder printed instead of values declared with `show_value(false)`.
pub const MASKED_VALUE: &str = "**** NOT SHOWN ****";

/// Predicate deciding whether a resolved variable value is acceptable.
pub type Validator = Arc<dyn Fn(&EnvValue) -> bool + Send + Sync>;

/// Value of an environment variable: a string or a number.
#[derive(Debug, Clone, PartialEq)]
pub enum EnvValue {
    String(String),
    Number(Number),
}

impl EnvValue {
    /// Returns the string form if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            EnvValue::String(s) => Some(s.as_str()),
            EnvValue::Number(_) => None,
        }
    }

    /// Returns the numeric value, parsing strings when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            EnvValue::String(s) => s.trim().parse().ok(),
            EnvValue::Number(n) => n.as_f64(),
        }
    }

    fn from_yaml(value: &YamlValue) -> Option<Self> {
        match value {
            YamlValue::String(s) => Some(EnvValue::String(s.clone())),
            YamlValue::Number(n) => Some(EnvValue::Number(n.clone())),
            _ => None,
        }
    }

    fn to_yaml(&self) -> YamlValue {
        match self {
            EnvValue::String(s) => YamlValue::String(s.clone()),
            EnvValue::Number(n) => YamlValue::Number(n.clone()),
        }
    }
}

impl fmt::Display for EnvValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvValue::String(s) => f.write_str(s),
            EnvValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        EnvValue::String(value.to_string())
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        EnvValue::String(value)
    }
}

impl From<i32> for EnvValue {
    fn from(value: i32) -> Self {
        EnvValue::Number(Number::from(i64::from(value)))
    }
}

impl From<i64> for EnvValue {
    fn from(value: i64) -> Self {
        EnvValue::Number(Number::from(value))
    }
}

impl From<u16> for EnvValue {
    fn from(value: u16) -> Self {
        EnvValue::Number(Number::from(u64::from(value)))
    }
}

impl From<u32> for EnvValue {
    fn from(value: u32) -> Self {
        EnvValue::Number(Number::from(u64::from(value)))
    }
}

impl From<u64> for EnvValue {
    fn from(value: u64) -> Self {
        EnvValue::Number(Number::from(value))
    }
}

impl From<f64> for EnvValue {
    fn from(value: f64) -> Self {
        EnvValue::Number(Number::from(value))
    }
}

impl PartialEq<&str> for EnvValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

/// String-keyed mapping of environment variables.
///
/// The manager owns one of these for its whole life. Defaults are written
/// into it during validation, and every module context receives a copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, EnvValue>,
}

impl Environment {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the variables of the current process.
    ///
    /// Variables whose key or value is not valid Unicode are skipped.
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&EnvValue> {
        self.vars.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<EnvValue>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EnvValue)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every variable of `other` into `self`, overwriting duplicates.
    pub fn overlay(&mut self, other: Environment) {
        self.vars.extend(other.vars);
    }
}

impl<K, V> FromIterator<(K, V)> for Environment
where
    K: Into<String>,
    V: Into<EnvValue>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            vars: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// An environment variable a module needs, as declared by the caller.
///
/// # Example
///
/// ```rust
/// use stagehand::EnvDeclaration;
///
/// let port = EnvDeclaration::new("PORT")
///     .with_default(8080)
///     .with_hint("TCP port the HTTP listener binds to")
///     .with_valid(|value| value.as_f64().map_or(false, |p| p > 0.0 && p < 65536.0));
///
/// let secret = EnvDeclaration::new("API_TOKEN").with_show_value(false);
/// # let _ = (port, secret);
/// ```
#[derive(Clone, Default, Deserialize)]
pub struct EnvDeclaration {
    #[serde(default)]
    name: Option<YamlValue>,
    #[serde(default)]
    default: Option<YamlValue>,
    #[serde(default)]
    hint: Option<YamlValue>,
    #[serde(default, alias = "showValue")]
    show_value: Option<YamlValue>,
    // A predicate can't be written in YAML; a non-null `valid` key is rejected.
    #[serde(default, rename = "valid")]
    valid_attribute: Option<YamlValue>,
    #[serde(skip)]
    valid: Option<Validator>,
}

impl EnvDeclaration {
    /// Declares a required variable.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(YamlValue::String(name.into())),
            ..Self::default()
        }
    }

    /// Value used when the variable is absent.
    pub fn with_default(mut self, value: impl Into<EnvValue>) -> Self {
        self.default = Some(value.into().to_yaml());
        self
    }

    /// Extra guidance appended to the missing-variable error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(YamlValue::String(hint.into()));
        self
    }

    /// Whether the value may appear in diagnostics (default `true`).
    pub fn with_show_value(mut self, show: bool) -> Self {
        self.show_value = Some(YamlValue::Bool(show));
        self
    }

    /// Predicate rejecting present but unacceptable values.
    pub fn with_valid<F>(mut self, valid: F) -> Self
    where
        F: Fn(&EnvValue) -> bool + Send + Sync + 'static,
    {
        self.valid = Some(Arc::new(valid));
        self
    }

    /// Parses a YAML sequence of declarations.
    ///
    /// ```yaml
    /// - name: DATABASE_URL
    ///   hint: postgres connection string
    ///   showValue: false
    /// - name: POOL_SIZE
    ///   default: 4
    /// ```
    pub fn list_from_yaml(yaml: &str) -> std::result::Result<Vec<Self>, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}

impl fmt::Debug for EnvDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvDeclaration")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("hint", &self.hint)
            .field("show_value", &self.show_value)
            .field("valid", &self.valid.is_some())
            .finish()
    }
}

/// A declaration after normalization: every field has a concrete value.
#[derive(Clone)]
pub struct EnvRequirement {
    pub name: String,
    pub default: Option<EnvValue>,
    pub hint: Option<String>,
    pub show_value: bool,
    pub valid: Validator,
}

impl fmt::Debug for EnvRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnvRequirement")
            .field("name", &self.name)
            .field("default", &self.default)
            .field("hint", &self.hint)
            .field("show_value", &self.show_value)
            .finish_non_exhaustive()
    }
}

fn declaration_error(module: &str, problem: &str) -> Error {
    Error::registration(format!(
        "Refusing to register module {} which has an env declaration {}",
        module, problem
    ))
}

/// Type-checks the declarations of `module` and fills in defaults.
pub fn normalize(module: &str, declarations: &[EnvDeclaration]) -> Result<Vec<EnvRequirement>> {
    declarations
        .iter()
        .map(|declaration| normalize_one(module, declaration))
        .collect()
}

fn normalize_one(module: &str, declaration: &EnvDeclaration) -> Result<EnvRequirement> {
    let name = match &declaration.name {
        Some(YamlValue::String(name)) => name.clone(),
        _ => return Err(declaration_error(module, "w/o a string name attribute")),
    };

    let hint = match &declaration.hint {
        None | Some(YamlValue::Null) => None,
        Some(YamlValue::String(hint)) => Some(hint.clone()),
        Some(_) => return Err(declaration_error(module, "with a non string hint attribute")),
    };

    let default = match &declaration.default {
        None | Some(YamlValue::Null) => None,
        Some(value) => Some(EnvValue::from_yaml(value).ok_or_else(|| {
            declaration_error(module, "with a non string/number default attribute")
        })?),
    };

    if matches!(&declaration.valid_attribute, Some(v) if !v.is_null()) {
        return Err(declaration_error(module, "with a non function valid attribute"));
    }
    let always_valid: Validator = Arc::new(|_: &EnvValue| true);
    let valid = declaration.valid.clone().unwrap_or(always_valid);

    let show_value = match &declaration.show_value {
        None => true,
        Some(YamlValue::Bool(show)) => *show,
        Some(_) => return Err(declaration_error(module, "with a non boolean showValue attribute")),
    };

    Ok(EnvRequirement {
        name,
        default,
        hint,
        show_value,
        valid,
    })
}

/// Resolves every requirement against `env`, in the order given.
///
/// Absent variables with a default get the default written into `env`.
/// Returns one message per violation; an empty list means every module can
/// start. Missing variables are also reported through `logger`.
pub fn check_environment<'a, I>(modules: I, env: &mut Environment, logger: &dyn Logger) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a [EnvRequirement])>,
{
    let mut errors = Vec::new();

    for (module, requirements) in modules {
        for requirement in requirements {
            if !env.contains(&requirement.name) {
                if let Some(default) = &requirement.default {
                    env.set(requirement.name.clone(), default.clone());
                } else {
                    let mut msg = format!(
                        "Module {} needs environment variable <{}>",
                        module, requirement.name
                    );
                    if let Some(hint) = &requirement.hint {
                        msg.push_str(": ");
                        msg.push_str(hint);
                    }
                    logger.error(&msg);
                    errors.push(msg);
                }
            }

            if let Some(value) = env.get(&requirement.name) {
                if !(requirement.valid)(value) {
                    errors.push(format!(
                        "Module {} has variable <{}> which was rejected by 'valid' predicate",
                        module, requirement.name
                    ));
                }
            }
        }
    }

    errors
}

/// One informational line per declared variable, values masked on request.
pub fn env_report<'a, I>(modules: I, env: &Environment) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, &'a [EnvRequirement])>,
{
    let mut report = Vec::new();

    for (module, requirements) in modules {
        for requirement in requirements {
            let value = if requirement.show_value {
                env.get(&requirement.name)
                    .map(ToString::to_string)
                    .unwrap_or_default()
            } else {
                MASKED_VALUE.to_string()
            };
            report.push(format!("Module {} env[{}] := <{}>", module, requirement.name, value));
        }
    }

    report
}
