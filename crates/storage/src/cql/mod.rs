//! The CQL subset understood by [`MemoryCluster`](crate::memory::MemoryCluster)
//!
//! Supported statements:
//!
//! ```text
//! CREATE KEYSPACE [IF NOT EXISTS] ks [WITH ...]
//! DROP KEYSPACE [IF EXISTS] ks
//! CREATE TABLE [IF NOT EXISTS] ks.t (col type, ..., PRIMARY KEY ((pk, ...), ck, ...))
//!     [WITH CLUSTERING ORDER BY (ck ASC|DESC, ...)]
//! DROP TABLE [IF EXISTS] ks.t
//! INSERT INTO ks.t (col, ...) VALUES (term, ...) [IF NOT EXISTS]
//! UPDATE ks.t SET col = term, ... WHERE col = term AND ... [IF EXISTS | IF col = term AND ...]
//! SELECT * | col, ... FROM ks.t [WHERE col = term AND ...] [LIMIT n] [ALLOW FILTERING]
//! DELETE FROM ks.t WHERE col = term AND ... [IF EXISTS]
//! ```
//!
//! A term is a `?` marker or a literal (string, number, boolean, null).
//! Table names must be keyspace-qualified.

mod lexer;

use std::fmt;

use docstore_core::{DataType, Value};

use crate::error::{StoreError, StoreResult};
pub use lexer::{tokenize, Token};

/// Keyspace-qualified table name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableName {
    /// Keyspace
    pub keyspace: String,
    /// Table
    pub table: String,
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.keyspace, self.table)
    }
}

/// Bind marker or literal
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// `?`, numbered in order of appearance
    Marker(usize),
    /// Inline literal
    Literal(Value),
}

/// `column = term`
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Column name
    pub column: String,
    /// Bound term
    pub term: Term,
}

/// Clustering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Ascending (default)
    #[default]
    Asc,
    /// Descending
    Desc,
}

/// Columns returned by a select
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// `*`
    All,
    /// Explicit column list
    Columns(Vec<String>),
}

/// `CREATE TABLE` definition
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTable {
    /// Table being created
    pub table: TableName,
    /// `IF NOT EXISTS`
    pub if_not_exists: bool,
    /// Column definitions in declaration order
    pub columns: Vec<(String, DataType)>,
    /// Partition key columns
    pub partition_key: Vec<String>,
    /// Clustering columns
    pub clustering_key: Vec<String>,
    /// `CLUSTERING ORDER BY` entries
    pub clustering_order: Vec<(String, Order)>,
}

/// Parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `CREATE KEYSPACE`
    CreateKeyspace {
        /// Keyspace
        name: String,
        /// `IF NOT EXISTS`
        if_not_exists: bool,
    },
    /// `DROP KEYSPACE`
    DropKeyspace {
        /// Keyspace
        name: String,
        /// `IF EXISTS`
        if_exists: bool,
    },
    /// `CREATE TABLE`
    CreateTable(CreateTable),
    /// `DROP TABLE`
    DropTable {
        /// Table
        table: TableName,
        /// `IF EXISTS`
        if_exists: bool,
    },
    /// `INSERT`
    Insert {
        /// Target table
        table: TableName,
        /// Column list
        columns: Vec<String>,
        /// Values, one per column
        values: Vec<Term>,
        /// `IF NOT EXISTS`
        if_not_exists: bool,
    },
    /// `UPDATE`
    Update {
        /// Target table
        table: TableName,
        /// `SET` assignments
        assignments: Vec<Relation>,
        /// `WHERE` relations
        relations: Vec<Relation>,
        /// `IF EXISTS`
        if_exists: bool,
        /// `IF col = term AND ...`; the row must exist and match
        conditions: Vec<Relation>,
    },
    /// `SELECT`
    Select {
        /// Source table
        table: TableName,
        /// Columns returned
        selection: Selection,
        /// `WHERE` relations
        relations: Vec<Relation>,
        /// `LIMIT`
        limit: Option<usize>,
    },
    /// `DELETE`
    Delete {
        /// Target table
        table: TableName,
        /// `WHERE` relations
        relations: Vec<Relation>,
        /// `IF EXISTS`
        if_exists: bool,
    },
}

impl Statement {
    /// Number of `?` markers
    pub fn marker_count(&self) -> usize {
        fn count(terms: &mut dyn Iterator<Item = &Term>) -> usize {
            terms.filter(|t| matches!(t, Term::Marker(_))).count()
        }
        match self {
            Statement::Insert { values, .. } => count(&mut values.iter()),
            Statement::Update {
                assignments,
                relations,
                conditions,
                ..
            } => count(
                &mut assignments
                    .iter()
                    .chain(relations.iter())
                    .chain(conditions.iter())
                    .map(|r| &r.term),
            ),
            Statement::Select { relations, .. } | Statement::Delete { relations, .. } => {
                count(&mut relations.iter().map(|r| &r.term))
            }
            _ => 0,
        }
    }

    /// Table a data statement targets
    pub fn table(&self) -> Option<&TableName> {
        match self {
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Select { table, .. }
            | Statement::Delete { table, .. } => Some(table),
            _ => None,
        }
    }
}

/// Parse one statement
pub fn parse(input: &str) -> StoreResult<Statement> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        markers: 0,
    };
    let statement = parser.statement()?;
    parser.accept(&Token::Semi);
    if let Some(token) = parser.peek() {
        return Err(StoreError::Syntax(format!(
            "unexpected trailing input at {:?}",
            token
        )));
    }
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    markers: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn accept(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> StoreResult<()> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(StoreError::Syntax(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> StoreResult<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(StoreError::Syntax(format!(
                "expected {}, found {:?}",
                keyword.to_ascii_uppercase(),
                self.peek()
            )))
        }
    }

    fn ident(&mut self) -> StoreResult<String> {
        match self.next() {
            Some(Token::Ident(word)) => Ok(word),
            other => Err(StoreError::Syntax(format!(
                "expected identifier, found {:?}",
                other
            ))),
        }
    }

    fn table_name(&mut self) -> StoreResult<TableName> {
        let keyspace = self.ident()?;
        if !self.accept(&Token::Dot) {
            return Err(StoreError::Syntax(format!(
                "table name '{}' must be keyspace-qualified",
                keyspace
            )));
        }
        let table = self.ident()?;
        Ok(TableName { keyspace, table })
    }

    fn if_not_exists(&mut self) -> StoreResult<bool> {
        if self.accept_keyword("if") {
            self.expect_keyword("not")?;
            self.expect_keyword("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn if_exists(&mut self) -> StoreResult<bool> {
        if self.accept_keyword("if") {
            self.expect_keyword("exists")?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn skip_to_end(&mut self) {
        while let Some(token) = self.peek() {
            if *token == Token::Semi {
                break;
            }
            self.pos += 1;
        }
    }

    fn statement(&mut self) -> StoreResult<Statement> {
        let verb = self.ident()?;
        match verb.as_str() {
            "create" => {
                if self.accept_keyword("keyspace") {
                    let if_not_exists = self.if_not_exists()?;
                    let name = self.ident()?;
                    // replication options are accepted and ignored
                    self.skip_to_end();
                    Ok(Statement::CreateKeyspace {
                        name,
                        if_not_exists,
                    })
                } else {
                    self.expect_keyword("table")?;
                    self.create_table().map(Statement::CreateTable)
                }
            }
            "drop" => {
                if self.accept_keyword("keyspace") {
                    let if_exists = self.if_exists()?;
                    let name = self.ident()?;
                    Ok(Statement::DropKeyspace { name, if_exists })
                } else {
                    self.expect_keyword("table")?;
                    let if_exists = self.if_exists()?;
                    let table = self.table_name()?;
                    Ok(Statement::DropTable { table, if_exists })
                }
            }
            "insert" => self.insert(),
            "update" => self.update(),
            "select" => self.select(),
            "delete" => self.delete(),
            other => Err(StoreError::Syntax(format!("unsupported statement '{}'", other))),
        }
    }

    fn create_table(&mut self) -> StoreResult<CreateTable> {
        let if_not_exists = self.if_not_exists()?;
        let table = self.table_name()?;
        self.expect(&Token::LParen)?;

        let mut columns = Vec::new();
        let mut partition_key = Vec::new();
        let mut clustering_key = Vec::new();

        loop {
            if self.accept_keyword("primary") {
                self.expect_keyword("key")?;
                self.expect(&Token::LParen)?;
                if self.accept(&Token::LParen) {
                    partition_key = self.ident_list()?;
                    self.expect(&Token::RParen)?;
                } else {
                    partition_key = vec![self.ident()?];
                }
                while self.accept(&Token::Comma) {
                    clustering_key.push(self.ident()?);
                }
                self.expect(&Token::RParen)?;
            } else {
                let name = self.ident()?;
                let type_name = self.ident()?;
                let data_type = type_name
                    .parse::<DataType>()
                    .map_err(|e| StoreError::Syntax(e.to_string()))?;
                if self.accept_keyword("primary") {
                    self.expect_keyword("key")?;
                    partition_key = vec![name.clone()];
                }
                columns.push((name, data_type));
            }

            if !self.accept(&Token::Comma) {
                break;
            }
        }
        self.expect(&Token::RParen)?;

        let mut clustering_order = Vec::new();
        if self.accept_keyword("with") {
            loop {
                if self.accept_keyword("clustering") {
                    self.expect_keyword("order")?;
                    self.expect_keyword("by")?;
                    self.expect(&Token::LParen)?;
                    loop {
                        let column = self.ident()?;
                        let order = if self.accept_keyword("desc") {
                            Order::Desc
                        } else {
                            self.accept_keyword("asc");
                            Order::Asc
                        };
                        clustering_order.push((column, order));
                        if !self.accept(&Token::Comma) {
                            break;
                        }
                    }
                    self.expect(&Token::RParen)?;
                } else {
                    // other table options are ignored up to the next AND
                    while let Some(token) = self.peek() {
                        if *token == Token::Semi || self.is_keyword("and") {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                if !self.accept_keyword("and") {
                    break;
                }
            }
        }

        if partition_key.is_empty() {
            return Err(StoreError::Invalid(format!(
                "table {} has no PRIMARY KEY",
                table
            )));
        }

        Ok(CreateTable {
            table,
            if_not_exists,
            columns,
            partition_key,
            clustering_key,
            clustering_order,
        })
    }

    fn ident_list(&mut self) -> StoreResult<Vec<String>> {
        let mut names = vec![self.ident()?];
        while self.accept(&Token::Comma) {
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn term(&mut self) -> StoreResult<Term> {
        match self.next() {
            Some(Token::Marker) => {
                let index = self.markers;
                self.markers += 1;
                Ok(Term::Marker(index))
            }
            Some(Token::Str(s)) => Ok(Term::Literal(Value::Text(s))),
            Some(Token::Int(n)) => Ok(Term::Literal(Value::BigInt(n))),
            Some(Token::Float(n)) => Ok(Term::Literal(Value::Double(n))),
            Some(Token::Ident(word)) if word == "true" => Ok(Term::Literal(Value::Boolean(true))),
            Some(Token::Ident(word)) if word == "false" => {
                Ok(Term::Literal(Value::Boolean(false)))
            }
            Some(Token::Ident(word)) if word == "null" => Ok(Term::Literal(Value::Null)),
            other => Err(StoreError::Syntax(format!(
                "expected value or '?', found {:?}",
                other
            ))),
        }
    }

    fn relation(&mut self) -> StoreResult<Relation> {
        let column = self.ident()?;
        self.expect(&Token::Eq)?;
        let term = self.term()?;
        Ok(Relation { column, term })
    }

    fn relations(&mut self) -> StoreResult<Vec<Relation>> {
        let mut relations = vec![self.relation()?];
        while self.accept_keyword("and") {
            relations.push(self.relation()?);
        }
        Ok(relations)
    }

    fn insert(&mut self) -> StoreResult<Statement> {
        self.expect_keyword("into")?;
        let table = self.table_name()?;
        self.expect(&Token::LParen)?;
        let columns = self.ident_list()?;
        self.expect(&Token::RParen)?;
        self.expect_keyword("values")?;
        self.expect(&Token::LParen)?;
        let mut values = vec![self.term()?];
        while self.accept(&Token::Comma) {
            values.push(self.term()?);
        }
        self.expect(&Token::RParen)?;
        if columns.len() != values.len() {
            return Err(StoreError::Invalid(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            )));
        }
        let if_not_exists = self.if_not_exists()?;
        Ok(Statement::Insert {
            table,
            columns,
            values,
            if_not_exists,
        })
    }

    fn update(&mut self) -> StoreResult<Statement> {
        let table = self.table_name()?;
        self.expect_keyword("set")?;
        let mut assignments = vec![self.relation()?];
        while self.accept(&Token::Comma) {
            assignments.push(self.relation()?);
        }
        self.expect_keyword("where")?;
        let relations = self.relations()?;
        let (if_exists, conditions) = if !self.accept_keyword("if") {
            (false, Vec::new())
        } else if self.accept_keyword("exists") {
            (true, Vec::new())
        } else {
            (false, self.relations()?)
        };
        Ok(Statement::Update {
            table,
            assignments,
            relations,
            if_exists,
            conditions,
        })
    }

    fn select(&mut self) -> StoreResult<Statement> {
        let selection = if self.accept(&Token::Star) {
            Selection::All
        } else {
            Selection::Columns(self.ident_list()?)
        };
        self.expect_keyword("from")?;
        let table = self.table_name()?;
        let relations = if self.accept_keyword("where") {
            self.relations()?
        } else {
            Vec::new()
        };
        let limit = if self.accept_keyword("limit") {
            match self.next() {
                Some(Token::Int(n)) if n > 0 => Some(n as usize),
                other => {
                    return Err(StoreError::Syntax(format!(
                        "LIMIT must be a positive integer, found {:?}",
                        other
                    )))
                }
            }
        } else {
            None
        };
        if self.accept_keyword("allow") {
            self.expect_keyword("filtering")?;
        }
        Ok(Statement::Select {
            table,
            selection,
            relations,
            limit,
        })
    }

    fn delete(&mut self) -> StoreResult<Statement> {
        self.expect_keyword("from")?;
        let table = self.table_name()?;
        self.expect_keyword("where")?;
        let relations = self.relations()?;
        let if_exists = self.if_exists()?;
        Ok(Statement::Delete {
            table,
            relations,
            if_exists,
        })
    }
}
