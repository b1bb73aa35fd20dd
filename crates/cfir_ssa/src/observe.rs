//! Edit observers and the recorded edit log.

use std::{cell::RefCell, fmt, rc::Rc};

use tracing::debug;

use crate::{edit::Edit, Cfg, Result};

/// Something that wants to hear about every edit applied to a graph.
///
/// Observers are called synchronously, after the edit took effect.
pub trait Observer {
    fn on_edit(&mut self, edit: &Edit, inverse: &Edit);

    fn on_section_begin(&mut self, _label: &str) {}

    fn on_section_end(&mut self) {}

    /// A free-form marker with no structural meaning.
    fn on_divider(&mut self, _label: &str) {}
}

impl<O: Observer + ?Sized> Observer for Rc<RefCell<O>> {
    fn on_edit(&mut self, edit: &Edit, inverse: &Edit) {
        self.borrow_mut().on_edit(edit, inverse)
    }

    fn on_section_begin(&mut self, label: &str) {
        self.borrow_mut().on_section_begin(label)
    }

    fn on_section_end(&mut self) {
        self.borrow_mut().on_section_end()
    }

    fn on_divider(&mut self, label: &str) {
        self.borrow_mut().on_divider(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u32);

#[derive(Default)]
pub(crate) struct Observers {
    next: u32,
    list: Vec<(ObserverId, Box<dyn Observer>)>,
}

impl Observers {
    fn add(&mut self, observer: Box<dyn Observer>) -> ObserverId {
        let id = ObserverId(self.next);
        self.next += 1;
        self.list.push((id, observer));
        id
    }

    fn remove(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        let index = self.list.iter().position(|(other, _)| *other == id)?;
        Some(self.list.remove(index).1)
    }

    pub(crate) fn notify(&mut self, edit: &Edit, inverse: &Edit) {
        for (_, observer) in &mut self.list {
            observer.on_edit(edit, inverse);
        }
    }

    pub(crate) fn section_begin(&mut self, label: &str) {
        debug!(section = label, "begin");
        for (_, observer) in &mut self.list {
            observer.on_section_begin(label);
        }
    }

    pub(crate) fn section_end(&mut self, label: &str) {
        debug!(section = label, "end");
        for (_, observer) in &mut self.list {
            observer.on_section_end();
        }
    }

    fn divider(&mut self, label: &str) {
        for (_, observer) in &mut self.list {
            observer.on_divider(label);
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.list.iter().map(|(id, _)| id))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EditLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Edit { forward: Edit, inverse: Edit },
    Section { label: String, records: Vec<Record> },
    Divider(String),
}

impl Record {
    fn undo(&self, cfg: &mut Cfg) -> Result<()> {
        match self {
            Record::Edit { inverse, .. } => {
                cfg.apply(inverse.clone())?;
            }
            Record::Section { records, .. } => {
                for record in records.iter().rev() {
                    record.undo(cfg)?;
                }
            }
            Record::Divider(_) => {}
        }
        Ok(())
    }

    fn replay(&self, cfg: &mut Cfg) -> Result<()> {
        match self {
            Record::Edit { forward, .. } => {
                cfg.apply(forward.clone())?;
            }
            Record::Section { label, records } => {
                cfg.section(label, |cfg| records.iter().try_for_each(|r| r.replay(cfg)))?;
            }
            Record::Divider(label) => cfg.divider(label),
        }
        Ok(())
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = depth * 2;
        match self {
            Record::Edit { forward, .. } => writeln!(f, "{:pad$}{}", "", forward),
            Record::Section { label, records } => {
                writeln!(f, "{:pad$}{} {{", "", label)?;
                for record in records {
                    record.fmt_indented(f, depth + 1)?;
                }
                writeln!(f, "{:pad$}}}", "")
            }
            Record::Divider(label) => writeln!(f, "{:pad$}-- {} --", "", label),
        }
    }
}

/// An observer that keeps every edit it sees, nested by section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditLog {
    records: Vec<Record>,
    open: Vec<(String, Vec<Record>)>,
}

impl EditLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, record: Record) {
        match self.open.last_mut() {
            Some((_, records)) => records.push(record),
            None => self.records.push(record),
        }
    }

    /// Closed top-level records, oldest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of edits recorded, looking through sections.
    pub fn len(&self) -> usize {
        fn count(records: &[Record]) -> usize {
            records
                .iter()
                .map(|r| match r {
                    Record::Edit { .. } => 1,
                    Record::Section { records, .. } => count(records),
                    Record::Divider(_) => 0,
                })
                .sum()
        }
        count(&self.records) + self.open.iter().map(|(_, r)| count(r)).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.open.clear();
    }

    /// Applies the recorded inverses to `cfg`, newest first.
    ///
    /// `cfg` must be in the state the log ends in. Undoing is not itself
    /// recorded by this log.
    pub fn undo(&self, cfg: &mut Cfg) -> Result<()> {
        for record in self.records.iter().rev() {
            record.undo(cfg)?;
        }
        Ok(())
    }

    /// Applies the recorded edits to `cfg`, oldest first. `cfg` must be in
    /// the state the log starts from; it does not need to be the graph the
    /// log was recorded on.
    pub fn replay(&self, cfg: &mut Cfg) -> Result<()> {
        for record in &self.records {
            record.replay(cfg)?;
        }
        Ok(())
    }
}

impl Observer for EditLog {
    fn on_edit(&mut self, edit: &Edit, inverse: &Edit) {
        self.push(Record::Edit {
            forward: edit.clone(),
            inverse: inverse.clone(),
        });
    }

    fn on_section_begin(&mut self, label: &str) {
        self.open.push((label.to_owned(), Vec::new()));
    }

    fn on_section_end(&mut self) {
        if let Some((label, records)) = self.open.pop() {
            self.push(Record::Section { label, records });
        }
    }

    fn on_divider(&mut self, label: &str) {
        self.push(Record::Divider(label.to_owned()));
    }
}

impl fmt::Display for EditLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            record.fmt_indented(f, 0)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Cfg hooks
// ---------------------------------------------------------------------------

impl Cfg {
    pub fn observe(&mut self, observer: impl Observer + 'static) -> ObserverId {
        self.observers.add(Box::new(observer))
    }

    /// Detaches an observer and hands it back.
    pub fn unobserve(&mut self, id: ObserverId) -> Option<Box<dyn Observer>> {
        self.observers.remove(id)
    }

    /// Runs `f`, reporting its edits to observers as one named section.
    ///
    /// Unlike an [`Edit::Section`], nothing is rolled back if `f` fails.
    pub fn section<R>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Cfg) -> Result<R>,
    ) -> Result<R> {
        self.observers.section_begin(label);
        let result = f(self);
        self.observers.section_end(label);
        result
    }

    pub fn divider(&mut self, label: &str) {
        self.observers.divider(label);
    }

    /// Runs `f` with a throwaway [`EditLog`] attached and returns the log
    /// alongside the result.
    pub fn record<R>(&mut self, f: impl FnOnce(&mut Cfg) -> R) -> (R, EditLog) {
        let log = Rc::new(RefCell::new(EditLog::new()));
        let id = self.observe(Rc::clone(&log));
        let result = f(self);
        self.unobserve(id);
        let log = Rc::try_unwrap(log)
            .map(RefCell::into_inner)
            .unwrap_or_else(|shared| shared.borrow().clone());
        (result, log)
    }

    /// Runs `f` as a section; if it fails, every edit it made is undone
    /// before the error is returned.
    pub fn transaction<R>(
        &mut self,
        label: &str,
        f: impl FnOnce(&mut Cfg) -> Result<R>,
    ) -> Result<R> {
        let (result, log) = self.record(|cfg| cfg.section(label, f));
        if result.is_err() {
            log.undo(self)?;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        inst::{Jump, Stmt},
        ty::Ty,
        BlockId,
    };

    #[derive(Default)]
    struct Counter {
        edits: usize,
        sections: Vec<String>,
        depth: usize,
    }

    impl Observer for Counter {
        fn on_edit(&mut self, _: &Edit, _: &Edit) {
            self.edits += 1;
        }

        fn on_section_begin(&mut self, label: &str) {
            self.sections.push(label.to_owned());
            self.depth += 1;
        }

        fn on_section_end(&mut self) {
            self.depth -= 1;
        }
    }

    #[test]
    fn test_observers_are_notified() {
        let mut cfg = Cfg::new();
        let counter = Rc::new(RefCell::new(Counter::default()));
        let id = cfg.observe(Rc::clone(&counter));
        let entry = cfg.entry().clone();
        cfg.push_stmt(&entry, Stmt::param(0, Ty::Int)).unwrap();
        cfg.insert_stmts(&entry, 0, vec![Stmt::Nop, Stmt::Nop]).unwrap();
        assert_eq!(counter.borrow().edits, 2);

        cfg.unobserve(id).unwrap();
        cfg.push_stmt(&entry, Stmt::Nop).unwrap();
        assert_eq!(counter.borrow().edits, 2);
    }

    #[test]
    fn test_sections_nest() {
        let mut cfg = Cfg::new();
        let counter = Rc::new(RefCell::new(Counter::default()));
        cfg.observe(Rc::clone(&counter));
        let entry = cfg.entry().clone();
        cfg.section("outer", |cfg| {
            cfg.split_new_successor(&entry, 0)?;
            cfg.section("inner", |cfg| cfg.add_bb("x"))
        })
        .unwrap();
        let counter = counter.borrow();
        assert_eq!(counter.sections, ["outer", "inner"]);
        assert_eq!(counter.depth, 0);
        assert_eq!(counter.edits, 2);
    }

    #[test]
    fn test_record_undo_and_replay() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let copy = cfg.duplicate();
        let before = cfg.to_string();

        let (exit, log) = cfg.record(|cfg| {
            let exit = cfg.split_new_successor(&entry, 0)?;
            cfg.divider("jumps");
            let x = cfg.push_stmt(&exit, Stmt::param(0, Ty::Int))?;
            cfg.add_jump(&exit, Jump::ret(x))?;
            Ok::<_, crate::Error>(exit)
        });
        let exit = exit.unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.records().len(), 4);
        let after = cfg.to_string();
        assert!(cfg.verify().is_ok());

        let mut replica = copy;
        log.replay(&mut replica).unwrap();
        assert_eq!(replica.to_string(), after);
        assert!(replica.has_block(&exit));

        log.undo(&mut cfg).unwrap();
        assert_eq!(cfg.to_string(), before);
    }

    #[test]
    fn test_transaction_rolls_back() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let before = cfg.to_string();
        let result = cfg.transaction("doomed", |cfg| {
            cfg.add_bb("a")?;
            cfg.push_stmt(&entry, Stmt::Nop)?;
            cfg.remove_bb(&BlockId::from("nowhere"))
        });
        assert!(result.is_err());
        assert_eq!(cfg.to_string(), before);
        assert!(!cfg.has_block(&BlockId::from("a")));
    }

    #[test]
    fn test_log_display() {
        let mut cfg = Cfg::new();
        let entry = cfg.entry().clone();
        let ((), log) = cfg.record(|cfg| {
            cfg.section("setup", |cfg| cfg.add_bb("a").map(drop)).unwrap();
            cfg.divider("done");
            cfg.push_stmt(&entry, Stmt::Nop).map(drop).unwrap();
        });
        assert_eq!(
            log.to_string(),
            "setup {\n  insert block a\n}\n-- done --\ninsert %nop = nop at entry[0]\n"
        );
    }
}
