use schemact::codegen::{MysqlGenerator, PostgresGenerator, SqliteGenerator};
use schemact::{parse_schema, Dialect, Error, SqlGenerator};

fn postgres() -> Box<dyn SqlGenerator> {
    Box::new(PostgresGenerator)
}

fn mysql() -> Box<dyn SqlGenerator> {
    Box::new(MysqlGenerator::default())
}

fn sqlite() -> Box<dyn SqlGenerator> {
    Box::new(SqliteGenerator)
}

fn up(generator: &dyn SqlGenerator, source: &str) -> Vec<String> {
    generator.generate_up(&parse_schema(source).unwrap()).unwrap()
}

fn down(generator: &dyn SqlGenerator, source: &str) -> Vec<String> {
    generator
        .generate_down(&parse_schema(source).unwrap())
        .unwrap()
}

#[test]
fn minimal_postgres_up_and_down() {
    let generator = postgres();
    assert_eq!(
        up(generator.as_ref(), "model User { id Serial @pk }"),
        vec!["CREATE TABLE \"User\" (\n  \"id\" SERIAL PRIMARY KEY\n);".to_string()]
    );
    assert_eq!(
        down(generator.as_ref(), "model User { id Serial @pk }"),
        vec!["DROP TABLE IF EXISTS \"User\" CASCADE;".to_string()]
    );
}

#[test]
fn empty_schema_generates_nothing() {
    let generator = postgres();
    assert!(up(generator.as_ref(), "").is_empty());
    assert!(down(generator.as_ref(), "").is_empty());
}

#[test]
fn enum_rendering_across_dialects() {
    let source = "model U { role Enum(admin, user) @default(user) }";

    let pg = up(postgres().as_ref(), source);
    assert!(pg[0].contains("VARCHAR(50) CHECK (\"role\" IN ('admin', 'user')) DEFAULT 'user'"));

    let my = up(mysql().as_ref(), source);
    assert!(my[0].contains("ENUM('admin', 'user') DEFAULT 'user'"));

    let lite = up(sqlite().as_ref(), source);
    assert_eq!(lite[0], "PRAGMA foreign_keys = ON;");
    assert!(lite[1].contains("TEXT CHECK (\"role\" IN ('admin', 'user')) DEFAULT 'user'"));
}

#[test]
fn foreign_key_with_cascade() {
    let source = "model Post { id Serial @pk authorId Int @ref(User.id) @onDelete(CASCADE) }";
    let pg = up(postgres().as_ref(), source);
    assert!(pg[0].contains("FOREIGN KEY (\"authorId\") REFERENCES \"User\"(\"id\") ON DELETE CASCADE"));

    let my = up(mysql().as_ref(), source);
    assert!(my[0].contains("FOREIGN KEY (`authorId`) REFERENCES `User`(`id`) ON DELETE CASCADE"));
}

#[test]
fn drop_order_reverses_model_order() {
    let source = "model A { id Int } model B { id Int } model C { id Int }";
    let statements = down(postgres().as_ref(), source);
    assert_eq!(
        statements,
        vec![
            "DROP TABLE IF EXISTS \"C\" CASCADE;".to_string(),
            "DROP TABLE IF EXISTS \"B\" CASCADE;".to_string(),
            "DROP TABLE IF EXISTS \"A\" CASCADE;".to_string(),
        ]
    );

    let lite = down(sqlite().as_ref(), source);
    assert_eq!(lite[0], "PRAGMA foreign_keys = ON;");
    assert!(lite[1].contains("\"C\""));
    assert!(lite[3].contains("\"A\""));
}

#[test]
fn default_value_formatting() {
    let source = "model M {\n  a Timestamp @default(now)\n  b Boolean @default(true)\n  c Boolean @default(false)\n  d Int @default(42)\n  e Text @default(\"it's\")\n}";

    let pg = up(postgres().as_ref(), source);
    assert!(pg[0].contains("\"a\" TIMESTAMP DEFAULT CURRENT_TIMESTAMP"));
    assert!(pg[0].contains("\"b\" BOOLEAN DEFAULT TRUE"));
    assert!(pg[0].contains("\"c\" BOOLEAN DEFAULT FALSE"));
    assert!(pg[0].contains("\"d\" INTEGER DEFAULT 42"));
    assert!(pg[0].contains("\"e\" TEXT DEFAULT 'it''s'"));

    let my = up(mysql().as_ref(), source);
    assert!(my[0].contains("`b` BOOLEAN DEFAULT 1"));
    assert!(my[0].contains("`c` BOOLEAN DEFAULT 0"));

    let lite = up(sqlite().as_ref(), source);
    assert!(lite[1].contains("\"b\" INTEGER DEFAULT 1"));
}

#[test]
fn type_argument_defaults() {
    let source = "model M { a VarChar b Char c Decimal d Numeric() }";
    let pg = up(postgres().as_ref(), source);
    assert!(pg[0].contains("\"a\" VARCHAR(255)"));
    assert!(pg[0].contains("\"b\" CHAR(1)"));
    assert!(pg[0].contains("\"c\" NUMERIC(10, 2)"));
    assert!(pg[0].contains("\"d\" NUMERIC(10, 2)"));

    let my = up(mysql().as_ref(), source);
    assert!(my[0].contains("`c` DECIMAL(10, 2)"));
}

#[test]
fn dialect_type_table() {
    let source = "model M {\n  a BigInt\n  b SmallInt\n  c Real\n  d DoublePrecision\n  e Json\n  f Jsonb\n  g Uuid\n  h VarChar(40)\n}";

    let pg = up(postgres().as_ref(), source);
    assert!(pg[0].contains("\"a\" BIGINT"));
    assert!(pg[0].contains("\"d\" DOUBLE PRECISION"));
    assert!(pg[0].contains("\"f\" JSONB"));
    assert!(pg[0].contains("\"g\" UUID"));
    assert!(pg[0].contains("\"h\" VARCHAR(40)"));

    let my = up(mysql().as_ref(), source);
    assert!(my[0].contains("`c` FLOAT"));
    assert!(my[0].contains("`d` DOUBLE"));
    assert!(my[0].contains("`f` JSON"));
    assert!(my[0].contains("`g` CHAR(36)"));

    let lite = up(sqlite().as_ref(), source);
    assert!(lite[1].contains("\"a\" INTEGER"));
    assert!(lite[1].contains("\"c\" REAL"));
    assert!(lite[1].contains("\"g\" TEXT"));
}

#[test]
fn mysql_serial_and_table_options() {
    let statements = up(mysql().as_ref(), "model User { id Serial @pk name Text }");
    assert!(statements[0].contains("`id` INT AUTO_INCREMENT PRIMARY KEY"));
    assert!(statements[0]
        .ends_with(") ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;"));

    let custom = MysqlGenerator::with_table_options("MyISAM", "latin1", "latin1_swedish_ci");
    let statements = custom
        .generate_up(&parse_schema("model User { id Serial @pk }").unwrap())
        .unwrap();
    assert!(statements[0].ends_with(") ENGINE=MyISAM DEFAULT CHARSET=latin1 COLLATE=latin1_swedish_ci;"));
}

#[test]
fn sqlite_integer_primary_keys_autoincrement() {
    let lite = sqlite();
    let statements = up(lite.as_ref(), "model M { id Int @pk }");
    assert!(statements[1].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));

    let statements = up(lite.as_ref(), "model M { id Serial }");
    assert!(statements[1].contains("\"id\" INTEGER PRIMARY KEY AUTOINCREMENT"));

    // A non-integer primary key gets no AUTOINCREMENT and nothing implied.
    let statements = up(lite.as_ref(), "model M { id Uuid @pk }");
    assert!(statements[1].contains("\"id\" TEXT PRIMARY KEY"));
    assert!(!statements[1].contains("AUTOINCREMENT"));
}

#[test]
fn raw_sql_passthrough_up_only() {
    let source = "model M { id Int }\n> CREATE INDEX idx ON m (id)\n";
    let statements = up(postgres().as_ref(), source);
    assert_eq!(statements.len(), 2);
    // Verbatim: no terminator appended.
    assert_eq!(statements[1], "CREATE INDEX idx ON m (id)");

    let statements = down(postgres().as_ref(), source);
    assert_eq!(statements.len(), 1);
    assert!(statements[0].starts_with("DROP TABLE"));
}

#[test]
fn decorator_misuse_is_a_generator_error() {
    let cases = [
        ("model M { id Int @wat }", "unknown decorator"),
        ("model M { id Int @pk(1) }", "takes no arguments"),
        ("model M { id Int @default() }", "requires exactly one value"),
        ("model M { id Int @ref(User) }", "dotted Table.column"),
        ("model M { id Int @onDelete(CASCADE) }", "requires @ref"),
        (
            "model M { id Int @ref(User.id) @onDelete(SOMETIMES) }",
            "invalid ON DELETE action",
        ),
        ("model M { kind Enum }", "at least one variant"),
        ("model M { a VarChar(abc) }", "must be numeric"),
    ];
    for (source, needle) in cases {
        let err = postgres()
            .generate_up(&parse_schema(source).unwrap())
            .unwrap_err();
        match &err {
            Error::Generator(message) => {
                assert!(
                    message.contains(needle),
                    "expected {:?} in {:?}",
                    needle,
                    message
                );
            }
            other => panic!("expected generator error for {:?}, got {:?}", source, other),
        }
    }
}

#[test]
fn on_delete_actions_validate_against_allowed_set() {
    for action in ["CASCADE", "RESTRICT", "'SET NULL'", "'NO ACTION'", "'SET DEFAULT'"] {
        let source = format!("model M {{ id Int @ref(U.id) @onDelete({}) }}", action);
        let statements = up(postgres().as_ref(), &source);
        let expected = action.trim_matches('\'');
        assert!(
            statements[0].contains(&format!("ON DELETE {}", expected)),
            "missing action {} in {}",
            expected,
            statements[0]
        );
    }
}

#[test]
fn long_identifiers_hit_the_dialect_cap() {
    let name = "c".repeat(70);
    let source = format!("model M {{ {} Int }}", name);
    let schema = parse_schema(&source).unwrap();

    // 70 characters clears SQLite's cap but not PostgreSQL's or MySQL's.
    assert!(matches!(
        postgres().generate_up(&schema),
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        mysql().generate_up(&schema),
        Err(Error::Validation(_))
    ));
    assert!(sqlite().generate_up(&schema).is_ok());

    assert_eq!(Dialect::Postgres.identifier_cap(), 63);
    assert_eq!(Dialect::Mysql.identifier_cap(), 64);
    assert_eq!(Dialect::Sqlite.identifier_cap(), 256);
}

#[test]
fn unique_and_notnull_render_in_order() {
    let statements = up(
        postgres().as_ref(),
        "model M { email VarChar(120) @unique @notnull }",
    );
    assert!(statements[0].contains("\"email\" VARCHAR(120) UNIQUE NOT NULL"));
}
