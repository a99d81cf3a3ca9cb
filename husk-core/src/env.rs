//! The scoped variable environment: a stack of global, function-local, and
//! command-transient scopes, with nameref resolution.

use std::collections::HashMap;
use std::collections::hash_map;

use crate::error::{Error, ErrorKind};
use crate::variables::{ValueLiteral, Variable, VariableValue};

/// Iterative nameref chains longer than this are treated as cycles.
const NAMEREF_CHAIN_LIMIT: usize = 8;

/// Where to look for a variable.
#[derive(Clone, Copy, Debug)]
pub enum EnvironmentLookup {
    /// Any scope, innermost first.
    Anywhere,
    /// Only the global scope.
    OnlyInGlobal,
    /// Only the innermost local scope.
    OnlyInCurrentLocal,
    /// Only a command-transient scope.
    OnlyInCommand,
}

/// The kind of a scope on the environment stack.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EnvironmentScope {
    /// Process-wide state.
    Global,
    /// State local to a function invocation.
    Local,
    /// Transient per-command assignment overrides.
    Command,
}

/// The variable environment.
#[derive(Clone, Debug)]
pub struct Environment {
    /// Scope stack; the top of the stack is the current scope.
    scopes: Vec<(EnvironmentScope, HashMap<String, Variable>)>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// Returns a new environment with an empty global scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![(EnvironmentScope::Global, HashMap::new())],
        }
    }

    /// Pushes a new scope.
    pub fn push_scope(&mut self, scope: EnvironmentScope) {
        self.scopes.push((scope, HashMap::new()));
    }

    /// Pops the top scope, which must be of the expected kind.
    pub fn pop_scope(&mut self, expected: EnvironmentScope) -> Result<(), Error> {
        match self.scopes.pop() {
            Some((actual, _)) if actual == expected => Ok(()),
            _ => Err(ErrorKind::BadSubstitution("scope imbalance".into()).into()),
        }
    }

    /// Returns whether any local scope is active.
    pub fn in_local_scope(&self) -> bool {
        self.scopes
            .iter()
            .any(|(kind, _)| matches!(kind, EnvironmentScope::Local))
    }

    /// Iterates over all visible variables (shadowed names appear once).
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        let mut visible: HashMap<&String, &Variable> = HashMap::new();

        for (_, map) in self.scopes.iter().rev() {
            for (name, var) in map {
                if let hash_map::Entry::Vacant(entry) = visible.entry(name) {
                    entry.insert(var);
                }
            }
        }

        visible.into_iter()
    }

    /// Iterates over exported variables.
    pub fn iter_exported(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.iter().filter(|(_, var)| var.is_exported())
    }

    /// Looks up a variable without following namerefs.
    pub fn get<S: AsRef<str>>(&self, name: S) -> Option<(EnvironmentScope, &Variable)> {
        for (scope, map) in self.scopes.iter().rev() {
            if let Some(var) = map.get(name.as_ref()) {
                return Some((*scope, var));
            }
        }
        None
    }

    /// Looks up a variable mutably without following namerefs.
    pub fn get_mut<S: AsRef<str>>(
        &mut self,
        name: S,
    ) -> Option<(EnvironmentScope, &mut Variable)> {
        for (scope, map) in self.scopes.iter_mut().rev() {
            if let Some(var) = map.get_mut(name.as_ref()) {
                return Some((*scope, var));
            }
        }
        None
    }

    /// Resolves a name through any nameref chain, bounded by
    /// [`NAMEREF_CHAIN_LIMIT`]. At the bound the chain is treated as unset and
    /// an error is reported.
    pub fn resolve_name(&self, name: &str) -> Result<String, Error> {
        let mut current = name.to_owned();

        for _ in 0..NAMEREF_CHAIN_LIMIT {
            match self.get(current.as_str()) {
                Some((_, var)) if var.is_nameref() => {
                    let target = var.value().as_str().to_string();
                    if target.is_empty() {
                        return Ok(current);
                    }
                    if !valid_variable_name(target.as_str()) {
                        return Err(ErrorKind::InvalidNamerefTarget(target).into());
                    }
                    current = target;
                }
                _ => return Ok(current),
            }
        }

        Err(ErrorKind::NamerefCycle(name.to_owned()).into())
    }

    /// Looks up a variable, following namerefs.
    pub fn get_resolving<S: AsRef<str>>(
        &self,
        name: S,
    ) -> Result<Option<(EnvironmentScope, &Variable)>, Error> {
        let resolved = self.resolve_name(name.as_ref())?;
        Ok(self.get(resolved.as_str()))
    }

    /// Returns the string value of a variable, if set.
    pub fn get_str<S: AsRef<str>>(&self, name: S) -> Option<std::borrow::Cow<'_, str>> {
        let resolved = self.resolve_name(name.as_ref()).ok()?;
        self.get(resolved.as_str())
            .and_then(|(_, var)| var.value().try_as_str())
    }

    /// Returns whether the named variable is set.
    pub fn is_set<S: AsRef<str>>(&self, name: S) -> bool {
        self.get(name.as_ref())
            .is_some_and(|(_, var)| var.value().is_set())
    }

    /// Adds (or replaces) a variable in the given scope.
    pub fn add<S: Into<String>>(
        &mut self,
        name: S,
        var: Variable,
        target: EnvironmentScope,
    ) -> Result<(), Error> {
        for (scope, map) in self.scopes.iter_mut().rev() {
            if *scope == target {
                map.insert(name.into(), var);
                return Ok(());
            }
        }
        Err(ErrorKind::BadSubstitution("missing scope".into()).into())
    }

    /// Sets a global scalar variable, following namerefs.
    pub fn set_global<N: AsRef<str>, V: Into<ValueLiteral>>(
        &mut self,
        name: N,
        value: V,
    ) -> Result<(), Error> {
        self.update_or_add(
            name.as_ref(),
            value.into(),
            |_| Ok(()),
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )
    }

    /// Updates a variable wherever it is visible per the lookup policy, or
    /// creates it in the given scope. The setter runs against the variable
    /// after assignment (used to apply attributes). Namerefs are followed.
    pub fn update_or_add<N: AsRef<str>>(
        &mut self,
        name: N,
        value: ValueLiteral,
        setter: impl Fn(&mut Variable) -> Result<(), Error>,
        lookup: EnvironmentLookup,
        creation_scope: EnvironmentScope,
    ) -> Result<(), Error> {
        self.update_or_add_appending(name, value, false, setter, lookup, creation_scope)
    }

    /// Like [`Self::update_or_add`], but optionally appending (`+=`) to any
    /// existing value.
    pub fn update_or_add_appending<N: AsRef<str>>(
        &mut self,
        name: N,
        value: ValueLiteral,
        append: bool,
        setter: impl Fn(&mut Variable) -> Result<(), Error>,
        lookup: EnvironmentLookup,
        creation_scope: EnvironmentScope,
    ) -> Result<(), Error> {
        let resolved = self.resolve_name(name.as_ref())?;

        if let Some((scope, var)) = self.get_mut(resolved.as_str()) {
            if lookup_matches(lookup, scope) {
                if var.is_readonly() {
                    return Err(ErrorKind::ReadonlyVariable(resolved).into());
                }
                var.assign(value, append)?;
                return setter(var);
            }
        }

        let mut var = Variable::new(VariableValue::Unset(
            crate::variables::UnsetKind::Untyped,
        ));
        var.assign(value, append)?;
        setter(&mut var)?;
        self.add(resolved, var, creation_scope)
    }

    /// Updates (or creates) an element of an array variable.
    pub fn update_or_add_array_element<N: AsRef<str>>(
        &mut self,
        name: N,
        index: String,
        value: String,
        append: bool,
        lookup: EnvironmentLookup,
        creation_scope: EnvironmentScope,
    ) -> Result<(), Error> {
        let resolved = self.resolve_name(name.as_ref())?;

        if let Some((scope, var)) = self.get_mut(resolved.as_str()) {
            if lookup_matches(lookup, scope) {
                if var.is_readonly() {
                    return Err(ErrorKind::ReadonlyVariable(resolved).into());
                }
                return var.assign_at_index(index, value, append);
            }
        }

        let mut var = Variable::new(VariableValue::Indexed(std::collections::BTreeMap::new()));
        var.assign_at_index(index, value, append)?;
        self.add(resolved, var, creation_scope)
    }

    /// Unsets a variable (following namerefs unless `nameref_only`); returns
    /// whether anything was removed.
    pub fn unset(&mut self, name: &str, nameref_only: bool) -> Result<bool, Error> {
        let target = if nameref_only {
            name.to_owned()
        } else {
            self.resolve_name(name)?
        };

        // When unsetting a nameref itself with -n, remove the reference.
        for (_, map) in self.scopes.iter_mut().rev() {
            if let Some(var) = map.get(target.as_str()) {
                if var.is_readonly() {
                    return Err(ErrorKind::ReadonlyVariable(target).into());
                }
                map.remove(target.as_str());
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Unsets an element of an array variable.
    pub fn unset_index(&mut self, name: &str, index: &str) -> Result<bool, Error> {
        let resolved = self.resolve_name(name)?;
        if let Some((_, var)) = self.get_mut(resolved.as_str()) {
            if var.is_readonly() {
                return Err(ErrorKind::ReadonlyVariable(resolved).into());
            }
            var.unset_index(index)
        } else {
            Ok(false)
        }
    }
}

const fn lookup_matches(lookup: EnvironmentLookup, scope: EnvironmentScope) -> bool {
    match lookup {
        EnvironmentLookup::Anywhere => true,
        EnvironmentLookup::OnlyInGlobal => matches!(scope, EnvironmentScope::Global),
        EnvironmentLookup::OnlyInCurrentLocal => matches!(scope, EnvironmentScope::Local),
        EnvironmentLookup::OnlyInCommand => matches!(scope, EnvironmentScope::Command),
    }
}

/// Returns whether the given string is a valid variable name.
pub fn valid_variable_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env_with(name: &str, value: &str) -> Environment {
        let mut env = Environment::new();
        env.set_global(name, value).unwrap();
        env
    }

    #[test]
    fn global_set_and_get() {
        let env = env_with("x", "1");
        assert_eq!(env.get_str("x").unwrap(), "1");
        assert!(env.get("missing").is_none());
    }

    #[test]
    fn local_scope_shadows_global() {
        let mut env = env_with("x", "global");

        env.push_scope(EnvironmentScope::Local);
        env.update_or_add(
            "x",
            "local".into(),
            |_| Ok(()),
            EnvironmentLookup::OnlyInCurrentLocal,
            EnvironmentScope::Local,
        )
        .unwrap();

        assert_eq!(env.get_str("x").unwrap(), "local");

        env.pop_scope(EnvironmentScope::Local).unwrap();
        assert_eq!(env.get_str("x").unwrap(), "global");
    }

    #[test]
    fn readonly_rejects_update() {
        let mut env = Environment::new();
        env.update_or_add(
            "x",
            "v".into(),
            |var| {
                var.set_readonly();
                Ok(())
            },
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )
        .unwrap();

        let result = env.set_global("x", "other");
        assert!(result.is_err());
        assert_eq!(env.get_str("x").unwrap(), "v");
    }

    #[test]
    fn nameref_resolution() {
        let mut env = env_with("target", "hello");
        env.update_or_add(
            "ref",
            "target".into(),
            |var| {
                var.set_nameref(true);
                Ok(())
            },
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )
        .unwrap();

        // Reads resolve through the reference.
        assert_eq!(env.get_str("ref").unwrap(), "hello");

        // Writes resolve through the reference too.
        env.set_global("ref", "world").unwrap();
        assert_eq!(env.get_str("target").unwrap(), "world");
    }

    #[test]
    fn nameref_cycle_is_bounded() {
        let mut env = Environment::new();
        for (name, target) in [("a", "b"), ("b", "a")] {
            env.update_or_add(
                name,
                target.into(),
                |var| {
                    var.set_nameref(true);
                    Ok(())
                },
                EnvironmentLookup::Anywhere,
                EnvironmentScope::Global,
            )
            .unwrap();
        }

        assert!(env.resolve_name("a").is_err());
    }

    #[test]
    fn unset_nameref_vs_target() {
        let mut env = env_with("target", "hello");
        env.update_or_add(
            "ref",
            "target".into(),
            |var| {
                var.set_nameref(true);
                Ok(())
            },
            EnvironmentLookup::Anywhere,
            EnvironmentScope::Global,
        )
        .unwrap();

        // Plain unset removes the referenced variable.
        assert!(env.unset("ref", false).unwrap());
        assert!(env.get("target").is_none());
        assert!(env.get("ref").is_some());

        // -n removes the nameref itself.
        assert!(env.unset("ref", true).unwrap());
        assert!(env.get("ref").is_none());
    }

    #[test]
    fn variable_name_validation() {
        assert!(valid_variable_name("abc"));
        assert!(valid_variable_name("_a1"));
        assert!(!valid_variable_name("1a"));
        assert!(!valid_variable_name(""));
        assert!(!valid_variable_name("a-b"));
    }
}
