use rustc_hash::FxHashMap;

use std::cell::RefCell;
use std::rc::Rc;

use crate::runtime::heap::Handle;

pub type EnvRef = Rc<RefCell<Environment>>;

/// One lexical scope. Links point from child to parent only, so a chain of
/// environments never forms a cycle on its own.
#[derive(Debug, Default)]
pub struct Environment {
    bindings: FxHashMap<String, Handle>,
    parent: Option<EnvRef>,
}

impl Environment {
    pub fn global() -> EnvRef {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn child(parent: &EnvRef) -> EnvRef {
        Rc::new(RefCell::new(Environment {
            bindings: FxHashMap::default(),
            parent: Some(parent.clone()),
        }))
    }

    pub fn parent(&self) -> Option<&EnvRef> {
        self.parent.as_ref()
    }

    /// Binds `name` here, returning the handle it shadows in this same scope.
    pub fn bind(&mut self, name: impl Into<String>, handle: Handle) -> Option<Handle> {
        self.bindings.insert(name.into(), handle)
    }

    pub fn get_local(&self, name: &str) -> Option<Handle> {
        self.bindings.get(name).copied()
    }

    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        self.bindings.values().copied()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn take_bindings(&mut self) -> FxHashMap<String, Handle> {
        std::mem::take(&mut self.bindings)
    }
}

/// Walks the chain from `env` outwards.
pub fn resolve(env: &EnvRef, name: &str) -> Option<Handle> {
    let mut current = env.clone();
    loop {
        let next = {
            let scope = current.borrow();
            if let Some(handle) = scope.get_local(name) {
                return Some(handle);
            }
            scope.parent.clone()
        };
        current = next?;
    }
}
