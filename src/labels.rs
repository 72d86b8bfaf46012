use crate::error::{Error, Result};
use crate::isa::classify;
use crate::lex::Token;
use crate::machine::Word;

/// A declared label and the address of the instruction following it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMetadata {
    pub name: String,
    pub ip: Word,
    /// Source index of the declaration token.
    pub index: usize,
}

/// Labels in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
    labels: Vec<LabelMetadata>,
}

impl LabelTable {
    fn insert(&mut self, name: &str, ip: Word, index: usize) -> Result<()> {
        if let Some(prev) = self.labels.iter().find(|l| l.name == name) {
            return Err(Error::DuplicateLabel {
                label: name.to_owned(),
                first: prev.index,
                second: index,
            });
        }

        self.labels.push(LabelMetadata {
            name: name.to_owned(),
            ip,
            index,
        });

        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<Word> {
        self.labels.iter().find(|l| l.name == name).map(|l| l.ip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LabelMetadata> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Walks the token stream once, jumping instruction by instruction, and
/// records the address each `:name` declaration denotes. Declarations take
/// up one token and no memory.
pub fn extract_labels(tokens: &[Token]) -> Result<LabelTable> {
    let mut table = LabelTable::default();
    let mut ip: Word = 0;
    let mut cursor = 0;

    while cursor < tokens.len() {
        let token = &tokens[cursor];

        if token.is_label_decl() {
            table.insert(token.label_name()?, ip, token.index)?;
            cursor += 1;
            continue;
        }

        let opcode = classify(tokens, cursor)?;
        if cursor + opcode.token_count() > tokens.len() {
            return Err(Error::UnexpectedEnd { index: token.index });
        }

        cursor += opcode.token_count();
        ip += opcode.ip_delta();
    }

    log::debug!("found {} labels, program spans {} words", table.len(), ip);

    Ok(table)
}

/// Drops label declarations and replaces every `.name` reference with the
/// decimal address of the label. Other tokens pass through unchanged.
pub fn substitute_labels(tokens: &[Token], labels: &LabelTable) -> Result<Vec<Token>> {
    let mut out = Vec::with_capacity(tokens.len());

    for token in tokens {
        if token.is_label_decl() {
            continue;
        }

        if token.is_label_ref() {
            let name = token.label_name()?;
            let ip = labels.lookup(name).ok_or_else(|| Error::UnknownLabel {
                index: token.index,
                label: name.to_owned(),
            })?;
            out.push(Token::new(ip.to_string(), token.index));
        } else {
            out.push(token.clone());
        }
    }

    Ok(out)
}
