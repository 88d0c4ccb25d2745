//! External function binding registry.
//!
//! Bindings belong to the controller, not to a story: they describe what the
//! host can do for any story and are forwarded to every engine it loads.

use std::collections::BTreeMap;

use fab_core::{EngineError, ExternalFunction, FromValue, IntoValue, StoryEngine, Value};

/// Conversion of a native closure into an [`ExternalFunction`].
///
/// Implemented for closures of arity 0 to 3 whose arguments implement
/// [`FromValue`] and whose result implements [`IntoValue`]. Arity and type
/// mismatches are not checked at bind time; they surface as
/// [`EngineError::ExternalFunction`] when the narrative makes the call.
pub trait IntoExternalFunction<Args> {
    /// Wrap `self` for the function called `name`.
    fn into_external(self, name: &str) -> ExternalFunction;
}

fn arity_fault(name: &str, expected: usize, got: usize) -> EngineError {
    EngineError::ExternalFunction {
        name: name.to_string(),
        reason: format!("expected {expected} arguments, got {got}"),
    }
}

fn argument<T: FromValue>(name: &str, args: &[Value], index: usize) -> Result<T, EngineError> {
    T::from_value(&args[index]).ok_or_else(|| EngineError::ExternalFunction {
        name: name.to_string(),
        reason: format!(
            "argument {} has unexpected type {}",
            index + 1,
            args[index].kind()
        ),
    })
}

impl<F, R> IntoExternalFunction<()> for F
where
    F: Fn() -> R + 'static,
    R: IntoValue,
{
    fn into_external(self, name: &str) -> ExternalFunction {
        let name = name.to_string();
        ExternalFunction::new(move |args| {
            if !args.is_empty() {
                return Err(arity_fault(&name, 0, args.len()));
            }
            Ok(self().into_value())
        })
    }
}

macro_rules! impl_into_external {
    ($arity:literal; $($arg:ident : $idx:tt),+) => {
        impl<F, R, $($arg),+> IntoExternalFunction<($($arg,)+)> for F
        where
            F: Fn($($arg),+) -> R + 'static,
            R: IntoValue,
            $($arg: FromValue,)+
        {
            fn into_external(self, name: &str) -> ExternalFunction {
                let name = name.to_string();
                ExternalFunction::new(move |args| {
                    if args.len() != $arity {
                        return Err(arity_fault(&name, $arity, args.len()));
                    }
                    Ok(self($(argument::<$arg>(&name, args, $idx)?),+).into_value())
                })
            }
        }
    };
}

impl_into_external!(1; A: 0);
impl_into_external!(2; A: 0, B: 1);
impl_into_external!(3; A: 0, B: 1, C: 2);

/// Named native callbacks available to loaded stories.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: BTreeMap<String, ExternalFunction>,
}

impl BindingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `function` as `name`, replacing any previous binding.
    pub fn bind(&mut self, name: &str, function: ExternalFunction) {
        if self.bindings.insert(name.to_string(), function).is_some() {
            log::debug!("replaced binding for '{name}'");
        }
    }

    /// Remove the binding for `name`. Returns whether one existed.
    pub fn unbind(&mut self, name: &str) -> bool {
        self.bindings.remove(name).is_some()
    }

    /// Remove every binding.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    /// Whether `name` is bound.
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// The callback bound to `name`.
    pub fn get(&self, name: &str) -> Option<&ExternalFunction> {
        self.bindings.get(name)
    }

    /// Forward every binding to `engine`.
    pub fn apply<E: StoryEngine + ?Sized>(&self, engine: &mut E) {
        for (name, function) in &self.bindings {
            engine.bind_external_function(name, function.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call<Args>(
        f: impl IntoExternalFunction<Args>,
        args: &[Value],
    ) -> fab_core::EngineResult<Option<Value>> {
        f.into_external("f").call(args)
    }

    #[test]
    fn arity_zero() {
        assert_eq!(call(|| 42i64, &[]).unwrap(), Some(Value::Int(42)));
        assert_eq!(call(|| (), &[]).unwrap(), None);
        assert!(call(|| 1i64, &[Value::Int(1)]).is_err());
    }

    #[test]
    fn arity_one_to_three() {
        assert_eq!(
            call(|x: i64| x * 2, &[Value::Int(4)]).unwrap(),
            Some(Value::Int(8))
        );
        assert_eq!(
            call(
                |a: String, b: String| format!("{a}{b}"),
                &[Value::Str("ab".into()), Value::Str("cd".into())]
            )
            .unwrap(),
            Some(Value::Str("abcd".into()))
        );
        assert_eq!(
            call(
                |a: i64, b: i64, c: bool| if c { a } else { b },
                &[Value::Int(1), Value::Int(2), Value::Bool(false)]
            )
            .unwrap(),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn wrong_type_is_a_fault() {
        let err = call(|x: i64| x, &[Value::Str("no".into())]).unwrap_err();
        assert_eq!(
            err,
            EngineError::ExternalFunction {
                name: "f".to_string(),
                reason: "argument 1 has unexpected type string".to_string(),
            }
        );
    }

    #[test]
    fn wrong_arity_is_a_fault() {
        let err = call(|a: i64, b: i64| a + b, &[Value::Int(1)]).unwrap_err();
        assert_eq!(
            err,
            EngineError::ExternalFunction {
                name: "f".to_string(),
                reason: "expected 2 arguments, got 1".to_string(),
            }
        );
    }

    #[test]
    fn bind_replaces() {
        let mut registry = BindingRegistry::new();
        registry.bind("f", (|| 1i64).into_external("f"));
        registry.bind("f", (|| 2i64).into_external("f"));
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["f"]);
        assert_eq!(
            registry.get("f").unwrap().call(&[]).unwrap(),
            Some(Value::Int(2))
        );
    }

    #[test]
    fn unbind_and_clear() {
        let mut registry = BindingRegistry::new();
        registry.bind("f", (|| ()).into_external("f"));
        registry.bind("g", (|| ()).into_external("g"));
        assert!(registry.unbind("f"));
        assert!(!registry.unbind("f"));
        assert!(registry.contains("g"));
        registry.clear();
        assert_eq!(registry.names().count(), 0);
    }
}
