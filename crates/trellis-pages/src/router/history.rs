//! Navigation history.
//!
//! An in-memory session history in the shape of the browser one: a list of
//! entries with a cursor, `push`/`replace` writes and `go(delta)` traversal.
//! Traversal notifies listeners the way `popstate` does; in hash mode pushing
//! a new fragment notifies them as well.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// How locations are stored in history entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryMode {
	/// Entries are paths: `/serie/42`.
	#[default]
	History,
	/// Entries are fragments: `#/serie/42`.
	Hash,
}

impl HistoryMode {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::History => "history",
			Self::Hash => "hash",
		}
	}
}

impl std::str::FromStr for HistoryMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"history" => Ok(Self::History),
			"hash" => Ok(Self::Hash),
			other => Err(format!("unknown history mode `{other}`")),
		}
	}
}

/// Callback receiving the location read from the current entry.
pub type HistoryListener = Rc<dyn Fn(String)>;

/// Session history.
pub struct History {
	mode: HistoryMode,
	entries: RefCell<Vec<String>>,
	index: Cell<usize>,
	listeners: RefCell<Vec<HistoryListener>>,
}

impl fmt::Debug for History {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("History")
			.field("mode", &self.mode)
			.field("entries", &self.entries.borrow())
			.field("index", &self.index.get())
			.finish()
	}
}

impl History {
	/// Creates a history holding one entry for `initial`.
	pub fn new(mode: HistoryMode, initial: &str) -> Self {
		let history = Self {
			mode,
			entries: RefCell::new(Vec::new()),
			index: Cell::new(0),
			listeners: RefCell::new(Vec::new()),
		};
		let entry = history.entry_for(initial);
		history.entries.borrow_mut().push(entry);
		history
	}

	pub fn mode(&self) -> HistoryMode {
		self.mode
	}

	/// How `location` is written into an entry in this mode.
	pub fn entry_for(&self, location: &str) -> String {
		match self.mode {
			HistoryMode::History => location.to_string(),
			HistoryMode::Hash => format!("#{}", location.trim_start_matches('#')),
		}
	}

	/// Raw current entry, as a browser would show it.
	pub fn current_entry(&self) -> String {
		self.entries
			.borrow()
			.get(self.index.get())
			.cloned()
			.unwrap_or_default()
	}

	/// Location read from the current entry: the path in history mode, the
	/// fragment in hash mode.
	pub fn location(&self) -> String {
		let entry = self.current_entry();
		match self.mode {
			HistoryMode::History => entry,
			HistoryMode::Hash => match entry.split_once('#') {
				Some((_, fragment)) => fragment.to_string(),
				None => String::new(),
			},
		}
	}

	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}

	pub fn index(&self) -> usize {
		self.index.get()
	}

	pub fn entries(&self) -> Vec<String> {
		self.entries.borrow().clone()
	}

	/// Adds an entry after the current one, dropping forward entries.
	pub fn push(&self, location: &str) {
		let entry = self.entry_for(location);
		{
			let mut entries = self.entries.borrow_mut();
			entries.truncate(self.index.get() + 1);
			entries.push(entry);
			self.index.set(entries.len() - 1);
		}
		if self.mode == HistoryMode::Hash {
			self.notify();
		}
	}

	/// Overwrites the current entry.
	pub fn replace(&self, location: &str) {
		let entry = self.entry_for(location);
		let mut entries = self.entries.borrow_mut();
		let index = self.index.get();
		match entries.get_mut(index) {
			Some(current) => *current = entry,
			None => entries.push(entry),
		}
	}

	/// Moves the cursor by `delta`. Out-of-range moves do nothing.
	///
	/// Returns `true` when the cursor moved; listeners are notified then.
	pub fn go(&self, delta: isize) -> bool {
		if delta == 0 {
			return false;
		}
		let Some(target) = self.index.get().checked_add_signed(delta) else {
			return false;
		};
		if target >= self.len() {
			return false;
		}
		self.index.set(target);
		self.notify();
		true
	}

	pub fn back(&self) -> bool {
		self.go(-1)
	}

	pub fn forward(&self) -> bool {
		self.go(1)
	}

	/// Registers a traversal listener.
	pub fn listen(&self, listener: HistoryListener) {
		self.listeners.borrow_mut().push(listener);
	}

	fn notify(&self) {
		let listeners = self.listeners.borrow().clone();
		let location = self.location();
		for listener in listeners {
			listener(location.clone());
		}
	}
}
