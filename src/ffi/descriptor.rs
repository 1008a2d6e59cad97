/*!
 * Binding Descriptor
 * Per-function signatures handed to the binder
 */

use super::types::{FfiError, FfiResult, NativeType};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Requested execution style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallMode {
    Sync,
    Async,
}

/// Cost hint; high-cost functions are routed like async ones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallCost {
    Low,
    Medium,
    High,
}

/// One native function: `{name, returns, args, mode?, cost?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionBinding {
    #[serde(default)]
    pub name: String,
    #[serde(alias = "returnType")]
    pub returns: String,
    #[serde(alias = "argTypes")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<CallMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<CallCost>,
}

/// Resolved calling-convention signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub returns: NativeType,
    pub args: Vec<NativeType>,
}

impl FunctionBinding {
    pub fn new<I, S>(name: impl Into<String>, returns: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            returns: returns.into(),
            args: args.into_iter().map(Into::into).collect(),
            mode: None,
            cost: None,
        }
    }

    pub fn with_mode(mut self, mode: CallMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_cost(mut self, cost: CallCost) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Async mode or high cost
    pub fn prefers_async(&self) -> bool {
        self.mode == Some(CallMode::Async) || self.cost == Some(CallCost::High)
    }

    /// Map every tag, failing on the first unsupported one
    pub fn resolve(&self) -> FfiResult<Signature> {
        if self.name.trim().is_empty() || self.returns.trim().is_empty() {
            return Err(FfiError::InvalidDescriptor(format!(
                "entry {:?} needs a name and a return type",
                self
            )));
        }

        let returns = NativeType::parse(&self.returns).ok_or_else(|| FfiError::UnsupportedType {
            function: self.name.clone(),
            position: "return".to_string(),
            tag: self.returns.clone(),
        })?;

        let args = self
            .args
            .iter()
            .enumerate()
            .map(|(i, tag)| {
                match NativeType::parse(tag) {
                    Some(NativeType::Void) | None => Err(FfiError::UnsupportedType {
                        function: self.name.clone(),
                        position: format!("arg[{}]", i),
                        tag: tag.clone(),
                    }),
                    Some(native) => Ok(native),
                }
            })
            .collect::<FfiResult<Vec<_>>>()?;

        Ok(Signature { returns, args })
    }
}

impl fmt::Display for FunctionBinding {
    /// C-like signature, e.g. `float64 dot(pointer<float64>, int32)`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}({})", self.returns, self.name, self.args.join(", "))
    }
}

/// Name-keyed function table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDescriptor {
    #[serde(deserialize_with = "deserialize_functions")]
    functions: BTreeMap<String, FunctionBinding>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FunctionTable {
    Map(BTreeMap<String, FunctionBinding>),
    List(Vec<FunctionBinding>),
}

/// Accept both the map form and the legacy array form
fn deserialize_functions<'de, D>(deserializer: D) -> Result<BTreeMap<String, FunctionBinding>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match FunctionTable::deserialize(deserializer)? {
        FunctionTable::Map(map) => map
            .into_iter()
            .map(|(key, mut binding)| {
                if binding.name.is_empty() {
                    binding.name = key;
                }
                binding
            })
            .collect::<Vec<_>>(),
        FunctionTable::List(list) => list,
    };
    Ok(entries.into_iter().map(|b| (b.name.clone(), b)).collect())
}

impl BindingDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_function(mut self, binding: FunctionBinding) -> Self {
        self.insert(binding);
        self
    }

    pub fn insert(&mut self, binding: FunctionBinding) {
        self.functions.insert(binding.name.clone(), binding);
    }

    pub fn from_json(json: &str) -> FfiResult<Self> {
        serde_json::from_str(json).map_err(|e| FfiError::InvalidDescriptor(e.to_string()))
    }

    pub fn get(&self, name: &str) -> Option<&FunctionBinding> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionBinding> {
        self.functions.values()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Override the execution mode of one function
    ///
    /// Only possible before the descriptor is handed to a dispatcher, which
    /// takes its own immutable copy.
    pub fn set_mode(&mut self, name: &str, mode: CallMode) -> FfiResult<()> {
        let binding = self.functions.get_mut(name).ok_or_else(|| {
            FfiError::InvalidDescriptor(format!("cannot override mode of unknown function '{}'", name))
        })?;
        binding.mode = Some(mode);
        Ok(())
    }

    /// Resolve every signature; the first invalid entry fails the whole table
    pub fn resolve_all(&self) -> FfiResult<BTreeMap<String, Signature>> {
        self.functions
            .iter()
            .map(|(name, binding)| Ok((name.clone(), binding.resolve()?)))
            .collect()
    }
}
