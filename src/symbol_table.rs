//! Label to value mapping built by the parse pass.

use std::collections::HashMap;

/// The resolved value of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub value: i32,

    /// `true` for constants defined with `EQU`. Absolute symbols do not move with the program
    /// and are encoded like numeric literals.
    pub absolute: bool,
}

impl Symbol {
    pub fn relative(value: i32) -> Symbol {
        Symbol {
            value,
            absolute: false,
        }
    }

    pub fn absolute(value: i32) -> Symbol {
        Symbol {
            value,
            absolute: true,
        }
    }
}

#[derive(Debug, Clone)]
enum Definition {
    Resolved(Symbol),

    /// `LABEL EQU OTHER`, settled by [SymbolTable::resolve_aliases].
    Alias(String),
}

#[derive(Debug, Clone)]
pub struct SymbolInfo {
    /// Line of the definition.
    pub line: usize,

    definition: Definition,
}

impl SymbolInfo {
    pub fn symbol(&self) -> Option<Symbol> {
        match self.definition {
            Definition::Resolved(symbol) => Some(symbol),
            Definition::Alias(_) => None,
        }
    }
}

/// Error for a label that is defined more than once.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateLabel {
    pub previous_line: usize,
}

/// Error for an `EQU` alias that can not be resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedAlias {
    /// The line of the `EQU`.
    pub line: usize,

    /// The symbol that could not be found, or that is part of a cycle.
    pub target: String,
}

#[derive(Default, Debug, Clone)]
pub struct SymbolTable {
    inner: HashMap<String, SymbolInfo>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    fn insert(&mut self, line: usize, label: &str, definition: Definition) -> Result<(), DuplicateLabel> {
        if let Some(previous) = self.inner.get(label) {
            return Err(DuplicateLabel {
                previous_line: previous.line,
            });
        }

        self.inner.insert(label.to_string(), SymbolInfo { line, definition });

        Ok(())
    }

    /// Defines `label`. Labels are case-sensitive and may only be defined once.
    pub fn define(&mut self, line: usize, label: &str, symbol: Symbol) -> Result<(), DuplicateLabel> {
        self.insert(line, label, Definition::Resolved(symbol))
    }

    /// Defines `label` as having the same value as `target`, which may not be defined yet.
    pub fn define_alias(&mut self, line: usize, label: &str, target: &str) -> Result<(), DuplicateLabel> {
        self.insert(line, label, Definition::Alias(target.to_string()))
    }

    /// Returns the value of `label` if it is defined and resolved.
    pub fn resolve(&self, label: &str) -> Option<Symbol> {
        self.inner.get(label).and_then(SymbolInfo::symbol)
    }

    /// Replaces every alias with the value of the symbol it refers to.
    ///
    /// Chains of aliases are followed. An alias that ends in an undefined symbol or loops back
    /// on itself is an error.
    pub fn resolve_aliases(&mut self) -> Result<(), UnresolvedAlias> {
        let mut aliases = self
            .inner
            .iter()
            .filter_map(|(label, info)| match &info.definition {
                Definition::Alias(_) => Some((label.clone(), info.line)),
                Definition::Resolved(_) => None,
            })
            .collect::<Vec<_>>();

        aliases.sort_by_key(|(_, line)| *line);

        for (label, line) in aliases {
            let mut current = label.clone();
            let mut steps = 0;

            let symbol = loop {
                let info = self.inner.get(&current).ok_or_else(|| UnresolvedAlias {
                    line,
                    target: current.clone(),
                })?;

                match &info.definition {
                    Definition::Resolved(symbol) => break *symbol,
                    Definition::Alias(target) => {
                        steps += 1;

                        if steps > self.inner.len() {
                            return Err(UnresolvedAlias { line, target: target.clone() });
                        }

                        current = target.clone();
                    }
                }
            };

            if let Some(info) = self.inner.get_mut(&label) {
                info.definition = Definition::Resolved(symbol);
            }
        }

        Ok(())
    }
}

#[test]
fn test_duplicate_label() {
    let mut table = SymbolTable::new();

    table.define(1, "LOOP", Symbol::relative(0x1003)).unwrap();
    assert_eq!(
        table.define(7, "LOOP", Symbol::relative(0x1010)),
        Err(DuplicateLabel { previous_line: 1 }),
    );

    // Labels are case-sensitive.
    table.define(8, "loop", Symbol::relative(0x1010)).unwrap();
    assert_eq!(table.resolve("LOOP"), Some(Symbol::relative(0x1003)));
}

#[test]
fn test_alias_chain() {
    let mut table = SymbolTable::new();

    table.define_alias(1, "C", "B").unwrap();
    table.define_alias(2, "B", "A").unwrap();
    table.define(3, "A", Symbol::absolute(42)).unwrap();

    assert_eq!(table.resolve("C"), None);
    table.resolve_aliases().unwrap();
    assert_eq!(table.resolve("C"), Some(Symbol::absolute(42)));
}

#[test]
fn test_alias_errors() {
    let mut table = SymbolTable::new();
    table.define_alias(4, "A", "NOWHERE").unwrap();
    assert_eq!(
        table.resolve_aliases(),
        Err(UnresolvedAlias { line: 4, target: "NOWHERE".into() }),
    );

    let mut table = SymbolTable::new();
    table.define_alias(1, "A", "B").unwrap();
    table.define_alias(2, "B", "A").unwrap();
    assert!(table.resolve_aliases().is_err());
}
