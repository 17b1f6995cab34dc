use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("academy.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_levels(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            level INTEGER NOT NULL UNIQUE,
            description TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            staff_no TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            student_no TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            grade_level INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_grade_level ON students(grade_level)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            position TEXT NOT NULL,
            staff_no TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT,
            grade_level INTEGER NOT NULL,
            teacher_id TEXT,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id) ON DELETE SET NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_grade_level ON courses(grade_level)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_teacher ON courses(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS evaluations(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            kind TEXT NOT NULL,
            date TEXT NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_course ON evaluations(course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_evaluations_course_date ON evaluations(course_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS scores(
            id TEXT PRIMARY KEY,
            evaluation_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            value REAL NOT NULL,
            FOREIGN KEY(evaluation_id) REFERENCES evaluations(id) ON DELETE CASCADE,
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE,
            UNIQUE(evaluation_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_evaluation ON scores(evaluation_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_scores_student ON scores(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_log(
            id TEXT PRIMARY KEY,
            actor_role TEXT NOT NULL,
            actor_id TEXT NOT NULL,
            actor_name TEXT NOT NULL,
            action TEXT NOT NULL,
            description TEXT NOT NULL,
            at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_log_at ON activity_log(at)",
        [],
    )?;

    // Workspaces created before course descriptions existed lack the column.
    ensure_courses_description(conn)?;

    Ok(())
}

fn ensure_courses_description(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "courses", "description")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE courses ADD COLUMN description TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Best-effort: a failed log write must never fail the request it describes.
pub fn log_activity(
    conn: &Connection,
    actor_role: &str,
    actor_id: &str,
    actor_name: &str,
    action: &str,
    description: &str,
) {
    let at = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
    let _ = conn.execute(
        "INSERT INTO activity_log(id, actor_role, actor_id, actor_name, action, description, at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            actor_role,
            actor_id,
            actor_name,
            action,
            description,
            at,
        ),
    );
}
