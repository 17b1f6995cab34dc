use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Scores live on a 0..=20 scale; at or above this mark a course is passed.
pub const PASS_MARK: f64 = 10.0;
pub const MAX_SCORE: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    Pass,
    Fail,
}

pub fn status_for(average: f64) -> Standing {
    if average >= PASS_MARK {
        Standing::Pass
    } else {
        Standing::Fail
    }
}

/// Qualitative band for a non-empty course average.
pub fn band_for(average: f64) -> &'static str {
    if average >= 15.0 {
        "Excellent"
    } else if average >= 12.0 {
        "Good"
    } else if average >= 10.0 {
        "Fair"
    } else {
        "Deficient"
    }
}

/// Round-half-up to two decimals. Presentation boundary only; sums and
/// means accumulate unrounded.
pub fn round_to_2(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / (values.len() as f64))
}

#[derive(Debug, Clone, Serialize)]
pub struct CalcError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CalcError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRef {
    pub id: String,
    pub display_name: String,
    pub grade_level: i64,
}

pub fn student_ref(conn: &Connection, student_id: &str) -> Result<StudentRef, CalcError> {
    let row: Option<(String, String, i64)> = conn
        .query_row(
            "SELECT first_name, last_name, grade_level FROM students WHERE id = ?",
            [student_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let Some((first, last, grade_level)) = row else {
        return Err(CalcError::new("not_found", "student not found"));
    };
    Ok(StudentRef {
        id: student_id.to_string(),
        display_name: format!("{}, {}", last, first),
        grade_level,
    })
}

/// All of one student's scores across the courses of one grade-level,
/// keyed by course, each list in evaluation-date order.
fn student_course_scores(
    conn: &Connection,
    student_id: &str,
    grade_level: i64,
) -> Result<HashMap<String, Vec<f64>>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT e.course_id, s.value
             FROM scores s
             JOIN evaluations e ON e.id = s.evaluation_id
             JOIN courses c ON c.id = e.course_id
             WHERE s.student_id = ? AND c.grade_level = ?
             ORDER BY e.date",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let rows = stmt
        .query_map((student_id, grade_level), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;

    let mut by_course: HashMap<String, Vec<f64>> = HashMap::new();
    for (course_id, value) in rows {
        by_course.entry(course_id).or_default().push(value);
    }
    Ok(by_course)
}

/// Mean of the student's scores in one course. None when no score
/// exists for the pair; unscored evaluations never count as zero.
pub fn average_for_student_in_course(
    conn: &Connection,
    student_id: &str,
    course_id: &str,
) -> Result<Option<f64>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.value
             FROM scores s
             JOIN evaluations e ON e.id = s.evaluation_id
             WHERE s.student_id = ? AND e.course_id = ?",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let values = stmt
        .query_map((student_id, course_id), |r| r.get::<_, f64>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    Ok(mean(&values))
}

/// Mean of the per-course averages over the courses in the student's
/// grade-level that hold at least one of their scores. Courses without
/// scores contribute to neither numerator nor denominator; with no
/// scored course at all the result is 0.
pub fn average_for_student_overall(
    conn: &Connection,
    student_id: &str,
) -> Result<f64, CalcError> {
    let student = student_ref(conn, student_id)?;
    let by_course = student_course_scores(conn, student_id, student.grade_level)?;
    let course_averages: Vec<f64> = by_course
        .values()
        .filter_map(|values| mean(values))
        .collect();
    Ok(mean(&course_averages).unwrap_or(0.0))
}

/// Mean over every score recorded for the course, all students. 0 when
/// the course has no scores.
pub fn average_for_course(conn: &Connection, course_id: &str) -> Result<f64, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT s.value
             FROM scores s
             JOIN evaluations e ON e.id = s.evaluation_id
             WHERE e.course_id = ?",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let values = stmt
        .query_map([course_id], |r| r.get::<_, f64>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    Ok(mean(&values).unwrap_or(0.0))
}

fn eligible_student_count(conn: &Connection, grade_level: i64) -> Result<i64, CalcError> {
    conn.query_row(
        "SELECT COUNT(*) FROM students WHERE grade_level = ?",
        [grade_level],
        |r| r.get(0),
    )
    .map_err(|e| CalcError::new("db_query_failed", e.to_string()))
}

/// Eligible students minus scored students for one evaluation, clamped
/// at zero. A stale score left behind by a grade-level change must not
/// drive the count negative.
pub fn pending_count(conn: &Connection, evaluation_id: &str) -> Result<i64, CalcError> {
    let grade_level: Option<i64> = conn
        .query_row(
            "SELECT c.grade_level
             FROM evaluations e
             JOIN courses c ON c.id = e.course_id
             WHERE e.id = ?",
            [evaluation_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let Some(grade_level) = grade_level else {
        return Err(CalcError::new("not_found", "evaluation not found"));
    };

    let eligible = eligible_student_count(conn, grade_level)?;
    let scored: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM scores WHERE evaluation_id = ?",
            [evaluation_id],
            |r| r.get(0),
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;

    Ok((eligible - scored).max(0))
}

pub fn is_fully_graded(conn: &Connection, evaluation_id: &str) -> Result<bool, CalcError> {
    Ok(pending_count(conn, evaluation_id)? == 0)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingEvaluation {
    pub evaluation_id: String,
    pub subject: String,
    pub kind: String,
    pub date: String,
    pub course_id: String,
    pub course_name: String,
    pub pending_count: i64,
    pub eligible_count: i64,
}

/// Grading work list for one teacher: every evaluation of their courses
/// with at least one eligible student unscored, nearest date first.
pub fn pending_evaluations(
    conn: &Connection,
    teacher_id: &str,
) -> Result<Vec<PendingEvaluation>, CalcError> {
    let known: Option<i64> = conn
        .query_row("SELECT 1 FROM teachers WHERE id = ?", [teacher_id], |r| {
            r.get(0)
        })
        .optional()
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    if known.is_none() {
        return Err(CalcError::new("not_found", "teacher not found"));
    }

    struct EvalRow {
        id: String,
        subject: String,
        kind: String,
        date: String,
        course_id: String,
        course_name: String,
        grade_level: i64,
    }

    let mut stmt = conn
        .prepare(
            "SELECT e.id, e.subject, e.kind, e.date, c.id, c.name, c.grade_level
             FROM evaluations e
             JOIN courses c ON c.id = e.course_id
             WHERE c.teacher_id = ?
             ORDER BY e.date",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let evals: Vec<EvalRow> = stmt
        .query_map([teacher_id], |r| {
            Ok(EvalRow {
                id: r.get(0)?,
                subject: r.get(1)?,
                kind: r.get(2)?,
                date: r.get(3)?,
                course_id: r.get(4)?,
                course_name: r.get(5)?,
                grade_level: r.get(6)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;

    let mut scored_by_eval: HashMap<String, i64> = HashMap::new();
    if !evals.is_empty() {
        let placeholders = std::iter::repeat("?")
            .take(evals.len())
            .collect::<Vec<_>>()
            .join(",");
        let sql = format!(
            "SELECT evaluation_id, COUNT(*)
             FROM scores
             WHERE evaluation_id IN ({})
             GROUP BY evaluation_id",
            placeholders
        );
        let bind_values: Vec<Value> = evals.iter().map(|e| Value::Text(e.id.clone())).collect();
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(bind_values), |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
        for (id, count) in rows {
            scored_by_eval.insert(id, count);
        }
    }

    let mut eligible_by_grade: HashMap<i64, i64> = HashMap::new();
    let mut out = Vec::new();
    for e in evals {
        let eligible = match eligible_by_grade.get(&e.grade_level) {
            Some(v) => *v,
            None => {
                let v = eligible_student_count(conn, e.grade_level)?;
                eligible_by_grade.insert(e.grade_level, v);
                v
            }
        };
        let scored = scored_by_eval.get(&e.id).copied().unwrap_or(0);
        let pending = (eligible - scored).max(0);
        if pending > 0 {
            out.push(PendingEvaluation {
                evaluation_id: e.id,
                subject: e.subject,
                kind: e.kind,
                date: e.date,
                course_id: e.course_id,
                course_name: e.course_name,
                pending_count: pending,
                eligible_count: eligible,
            });
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummaryRow {
    pub course_id: String,
    pub course_name: String,
    pub scores: Vec<f64>,
    pub evaluations_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    pub has_scores: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub student: StudentRef,
    pub subjects: Vec<SubjectSummaryRow>,
}

fn courses_in_grade(
    conn: &Connection,
    grade_level: i64,
) -> Result<Vec<(String, String)>, CalcError> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM courses WHERE grade_level = ? ORDER BY name")
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    stmt.query_map([grade_level], |r| Ok((r.get(0)?, r.get(1)?)))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))
}

/// One row per course in the student's grade-level, course name order.
/// Courses without scores stay in the list, flagged rather than averaged:
/// a missing score is absent data, not a zero.
pub fn build_subject_summary(
    conn: &Connection,
    student_id: &str,
) -> Result<SubjectSummary, CalcError> {
    let student = student_ref(conn, student_id)?;
    let courses = courses_in_grade(conn, student.grade_level)?;
    let mut by_course = student_course_scores(conn, student_id, student.grade_level)?;

    let mut subjects = Vec::with_capacity(courses.len());
    for (course_id, course_name) in courses {
        let scores = by_course.remove(&course_id).unwrap_or_default();
        let average = mean(&scores).map(round_to_2);
        let has_scores = !scores.is_empty();
        subjects.push(SubjectSummaryRow {
            course_id,
            course_name,
            evaluations_count: scores.len(),
            scores,
            average,
            has_scores,
        });
    }
    Ok(SubjectSummary { student, subjects })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCardRow {
    pub course_id: String,
    pub course_name: String,
    pub average: f64,
    pub standing: Standing,
    pub band: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub student: StudentRef,
    pub rows: Vec<ReportCardRow>,
    pub overall_average: f64,
}

/// Report card rows cover only courses holding at least one score --
/// narrower than the subject summary on purpose. The overall average is
/// the mean of the included per-course averages, 0 with no rows.
pub fn build_report_card(conn: &Connection, student_id: &str) -> Result<ReportCard, CalcError> {
    let student = student_ref(conn, student_id)?;
    let courses = courses_in_grade(conn, student.grade_level)?;
    let by_course = student_course_scores(conn, student_id, student.grade_level)?;

    let mut rows = Vec::new();
    let mut course_averages = Vec::new();
    for (course_id, course_name) in courses {
        let Some(values) = by_course.get(&course_id) else {
            continue;
        };
        let Some(average) = mean(values) else {
            continue;
        };
        course_averages.push(average);
        rows.push(ReportCardRow {
            course_id,
            course_name,
            average: round_to_2(average),
            standing: status_for(average),
            band: band_for(average).to_string(),
        });
    }

    let overall_average = round_to_2(mean(&course_averages).unwrap_or(0.0));
    Ok(ReportCard {
        student,
        rows,
        overall_average,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedStudent {
    pub student_id: String,
    pub display_name: String,
    pub scored_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

/// Grade-level ranking by the mean of raw scores (all of a student's
/// scores pooled, not the report card's mean of course means). Unscored
/// students sort last, ties by name.
pub fn grade_ranking(conn: &Connection, grade_level: i64) -> Result<Vec<RankedStudent>, CalcError> {
    let mut stmt = conn
        .prepare(
            "SELECT id, first_name, last_name FROM students WHERE grade_level = ?
             ORDER BY last_name, first_name",
        )
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
    let students: Vec<(String, String, String)> = stmt
        .query_map([grade_level], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;

    let mut ranked = Vec::with_capacity(students.len());
    for (id, first, last) in students {
        let mut stmt = conn
            .prepare("SELECT value FROM scores WHERE student_id = ?")
            .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
        let values = stmt
            .query_map([&id], |r| r.get::<_, f64>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| CalcError::new("db_query_failed", e.to_string()))?;
        ranked.push(RankedStudent {
            student_id: id,
            display_name: format!("{}, {}", last, first),
            scored_count: values.len(),
            average: mean(&values).map(round_to_2),
        });
    }

    ranked.sort_by(|a, b| match (b.average, a.average) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.display_name.cmp(&b.display_name)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.display_name.cmp(&b.display_name),
    });
    Ok(ranked)
}
