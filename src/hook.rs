use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEventKind {
    Statement,
    LoopIteration,
}

#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    pub kind: HookEventKind,
    pub line: u32,
    pub column: u32,
    pub depth: usize,
    pub file: Option<&'a Path>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookControl {
    Continue,
    /// Abort evaluation with an uncatchable `Interrupted` error.
    Interrupt,
}

pub trait ExecutionHook {
    fn on_event(&mut self, event: &HookEvent<'_>) -> HookControl;
}

impl<F> ExecutionHook for F
where
    F: FnMut(&HookEvent<'_>) -> HookControl,
{
    fn on_event(&mut self, event: &HookEvent<'_>) -> HookControl {
        self(event)
    }
}

#[derive(Debug, Default)]
pub struct TracingHook;

impl ExecutionHook for TracingHook {
    fn on_event(&mut self, event: &HookEvent<'_>) -> HookControl {
        tracing::debug!(
            kind = ?event.kind,
            line = event.line,
            column = event.column,
            depth = event.depth,
            file = ?event.file,
            "step"
        );
        HookControl::Continue
    }
}

/// Interrupts evaluation once a fixed number of events has been seen.
#[derive(Debug)]
pub struct StepBudget {
    remaining: u64,
}

impl StepBudget {
    pub fn new(steps: u64) -> Self {
        Self { remaining: steps }
    }
}

impl ExecutionHook for StepBudget {
    fn on_event(&mut self, _event: &HookEvent<'_>) -> HookControl {
        if self.remaining == 0 {
            return HookControl::Interrupt;
        }
        self.remaining -= 1;
        HookControl::Continue
    }
}

#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn ExecutionHook>>,
}

impl HookChain {
    pub fn push(&mut self, hook: Box<dyn ExecutionHook>) {
        self.hooks.push(hook);
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ExecutionHook for HookChain {
    fn on_event(&mut self, event: &HookEvent<'_>) -> HookControl {
        for hook in &mut self.hooks {
            if hook.on_event(event) == HookControl::Interrupt {
                return HookControl::Interrupt;
            }
        }
        HookControl::Continue
    }
}
