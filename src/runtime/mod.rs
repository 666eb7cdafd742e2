pub mod environment;
pub mod frame;
pub mod heap;
pub mod interpreter;
pub mod operators;
pub mod print_handler;
pub mod value;
pub mod vm;

#[cfg(test)]
pub mod test;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use std::rc::Rc;

use crate::errors::{HelixError, HelixResult};
use crate::span::Span;

pub use environment::{EnvRef, Environment};
pub use frame::CallFrame;
pub use heap::{Handle, Heap, HeapStats};
pub use interpreter::Interpreter;
pub use print_handler::PrintHandler;
pub use value::{Closure, ClosureBody, DomainRegistry, DomainValue, NativeFunction, Value};
pub use vm::Vm;

pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// State shared by the tree-walking interpreter and the bytecode VM: the
/// environment chain, call frames and the reference-counted heap.
///
/// Every environment that still holds bindings is owned by a frame, by the
/// global slot, or by the escaped list. Environments leave a frame when
/// their scope exits; if a closure still points at one it moves to the
/// escaped list until a sweep finds it unreachable.
#[derive(Debug)]
pub struct Runtime {
    heap: Heap,
    globals: EnvRef,
    main: CallFrame,
    frames: Vec<CallFrame>,
    escaped: Vec<EnvRef>,
    max_depth: usize,
    printer: PrintHandler,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}

impl Runtime {
    pub fn new(max_depth: usize) -> Self {
        let globals = Environment::global();
        Runtime {
            heap: Heap::new(),
            main: CallFrame::new("<main>", globals.clone()),
            globals,
            frames: vec![],
            escaped: vec![],
            max_depth,
            printer: PrintHandler::default(),
        }
    }

    pub fn with_printer(mut self, printer: PrintHandler) -> Self {
        self.printer = printer;
        self
    }

    pub fn printer(&self) -> &PrintHandler {
        &self.printer
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn globals(&self) -> &EnvRef {
        &self.globals
    }

    /// Number of active calls.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self) -> &CallFrame {
        self.frames.last().unwrap_or(&self.main)
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => &mut self.main,
        }
    }

    pub fn current_env(&self) -> EnvRef {
        self.frame().env.clone()
    }

    pub fn escaped(&self) -> usize {
        self.escaped.len()
    }

    /// Binds `name` globally, releasing whatever it was bound to before.
    pub fn define_global(&mut self, name: impl Into<String>, value: Value) -> HelixResult<Handle> {
        let name = name.into();
        let handle = self.heap.alloc(value);
        let shadowed = self.globals.borrow_mut().bind(name, handle);
        if let Some(old) = shadowed {
            self.heap.release(old)?;
        }
        Ok(handle)
    }

    pub fn define_native(&mut self, native: NativeFunction) -> HelixResult<Handle> {
        let name = native.name.clone();
        self.define_global(name, Value::Native(Rc::new(native)))
    }

    /// Allocates `value` and binds it in the innermost scope.
    pub fn declare(&mut self, name: impl Into<String>, value: Value) -> HelixResult<Handle> {
        let name = name.into();
        let handle = self.heap.alloc(value);
        trace!(%name, ?handle, "declare");
        let shadowed = self.frame().env.borrow_mut().bind(name, handle);
        if let Some(old) = shadowed {
            self.heap.release(old)?;
        }
        Ok(handle)
    }

    fn resolve(&self, name: &str) -> Option<Handle> {
        environment::resolve(&self.frame().env, name)
            .or_else(|| self.globals.borrow().get_local(name))
    }

    pub fn lookup(&self, name: &str, span: Span) -> HelixResult<Value> {
        let handle = self
            .resolve(name)
            .ok_or_else(|| HelixError::runtime(format!("undefined variable '{name}'"), span))?;
        self.heap.get(handle).cloned().map_err(|e| e.at(span))
    }

    pub fn assign(&mut self, name: &str, value: Value, span: Span) -> HelixResult<()> {
        let handle = self
            .resolve(name)
            .ok_or_else(|| HelixError::runtime(format!("undefined variable '{name}'"), span))?;
        self.heap.set(handle, value).map_err(|e| e.at(span))?;
        Ok(())
    }

    pub fn push_scope(&mut self) {
        let frame = self.frame_mut();
        frame.env = Environment::child(&frame.env);
        frame.scopes += 1;
    }

    /// Leaves the innermost scope, releasing its locals unless a closure
    /// still refers to it.
    pub fn pop_scope(&mut self) -> HelixResult<()> {
        let frame = self.frame_mut();
        if frame.scopes == 0 {
            return Err(HelixError::memory(
                format!("scope stack underflow in '{}'", frame.function),
                Span::default(),
            ));
        }
        let parent = frame.env.borrow().parent().cloned();
        let Some(parent) = parent else {
            return Err(HelixError::memory(
                "scope without a parent environment",
                Span::default(),
            ));
        };
        let env = std::mem::replace(&mut frame.env, parent);
        frame.scopes -= 1;
        self.release_env(env)
    }

    /// Pushes `frame` and opens its function scope under the environment
    /// the frame was created with.
    pub fn enter_call(&mut self, frame: CallFrame) -> HelixResult<()> {
        if self.frames.len() >= self.max_depth {
            return Err(HelixError::runtime(
                format!(
                    "maximum recursion depth of {} exceeded in '{}'",
                    self.max_depth, frame.function
                ),
                frame.call_site,
            ));
        }
        trace!(function = %frame.function, depth = self.frames.len() + 1, "call");
        self.frames.push(frame);
        self.push_scope();
        Ok(())
    }

    /// Unwinds every scope of the innermost call and pops its frame.
    pub fn exit_call(&mut self) -> HelixResult<CallFrame> {
        if self.frames.is_empty() {
            return Err(HelixError::runtime("return outside of a function", Span::default()));
        }
        while self.frame().scopes > 0 {
            self.pop_scope()?;
        }
        self.frames
            .pop()
            .ok_or_else(|| HelixError::runtime("return outside of a function", Span::default()))
    }

    fn release_env(&mut self, env: EnvRef) -> HelixResult<()> {
        if Rc::strong_count(&env) == 1 {
            return self.release_bindings(&env);
        }
        self.escaped.push(env);
        self.collect()?;
        Ok(())
    }

    fn release_bindings(&mut self, env: &EnvRef) -> HelixResult<()> {
        let bindings = env.borrow_mut().take_bindings();
        for (name, handle) in bindings {
            if self.heap.release(handle)?.is_some() {
                trace!(%name, ?handle, "released");
            }
        }
        Ok(())
    }

    /// Releases escaped environments that nothing outside the escaped set
    /// can reach any more. Returns how many were released.
    pub fn collect(&mut self) -> HelixResult<usize> {
        let mut released = 0;
        loop {
            let dead = self.unreachable_escaped();
            if dead.is_empty() {
                break;
            }
            let mut dead_envs = vec![];
            self.escaped.retain(|env| {
                if dead.contains(&env_id(env)) {
                    dead_envs.push(env.clone());
                    false
                } else {
                    true
                }
            });
            for env in &dead_envs {
                self.release_bindings(env)?;
            }
            released += dead_envs.len();
        }
        if released > 0 {
            debug!(released, remaining = self.escaped.len(), "collected environments");
        }
        Ok(released)
    }

    /// Trial deletion over the escaped set: subtract every reference that
    /// comes from inside the set, then keep whatever is reachable from an
    /// environment with references left over.
    fn unreachable_escaped(&self) -> FxHashSet<usize> {
        let index: FxHashMap<usize, usize> = self
            .escaped
            .iter()
            .enumerate()
            .map(|(i, env)| (env_id(env), i))
            .collect();
        let mut external: Vec<isize> = self
            .escaped
            .iter()
            .map(|env| Rc::strong_count(env) as isize - 1)
            .collect();

        // closure id -> (strong count, occurrences inside the set, captured env)
        let mut closures: FxHashMap<usize, (usize, usize, usize)> = FxHashMap::default();
        let mut edges: Vec<Vec<usize>> = vec![vec![]; self.escaped.len()];
        for (i, env) in self.escaped.iter().enumerate() {
            let env = env.borrow();
            if let Some(&parent) = env.parent().and_then(|p| index.get(&env_id(p))) {
                external[parent] -= 1;
                edges[i].push(parent);
            }
            for handle in env.handles() {
                if let Ok(Value::Function(closure)) = self.heap.get(handle) {
                    let captured = env_id(&closure.env);
                    let entry = closures
                        .entry(Rc::as_ptr(closure) as usize)
                        .or_insert((Rc::strong_count(closure), 0, captured));
                    entry.1 += 1;
                    if let Some(&target) = index.get(&captured) {
                        edges[i].push(target);
                    }
                }
            }
        }
        for (count, seen, captured) in closures.into_values() {
            if seen == count {
                if let Some(&target) = index.get(&captured) {
                    external[target] -= 1;
                }
            }
        }

        let mut reachable = vec![false; self.escaped.len()];
        let mut work: Vec<usize> = (0..self.escaped.len())
            .filter(|&i| external[i] > 0)
            .collect();
        while let Some(i) = work.pop() {
            if std::mem::replace(&mut reachable[i], true) {
                continue;
            }
            work.extend(edges[i].iter().copied().filter(|&j| !reachable[j]));
        }

        self.escaped
            .iter()
            .zip(reachable)
            .filter(|(_, live)| !live)
            .map(|(env, _)| env_id(env))
            .collect()
    }

    /// Releases everything: open calls, escaped environments and globals.
    /// After this the heap holds no live objects.
    pub fn teardown(&mut self) -> HelixResult<()> {
        while !self.frames.is_empty() {
            self.exit_call()?;
        }
        while self.main.scopes > 0 {
            self.pop_scope()?;
        }
        for env in std::mem::take(&mut self.escaped) {
            self.release_bindings(&env)?;
        }
        let globals = self.globals.clone();
        self.release_bindings(&globals)?;
        debug!(stats = ?self.heap.stats(), "runtime torn down");
        Ok(())
    }
}

fn env_id(env: &EnvRef) -> usize {
    Rc::as_ptr(env) as *const () as usize
}
