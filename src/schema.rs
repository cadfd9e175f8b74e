//! Relation schema context
//!
//! Configuration data, not logic: the read-only views exposed to queries,
//! their columns, and the few-shot examples embedded into the generation
//! prompt. The validator's allow-list is derived from this set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationSchema {
    pub name: String,
    pub description: String,
    pub columns: Vec<ColumnSchema>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaContext {
    pub relations: Vec<RelationSchema>,
}

fn column(name: &str, data_type: &str, description: &str) -> ColumnSchema {
    ColumnSchema {
        name: name.to_string(),
        data_type: data_type.to_string(),
        description: description.to_string(),
    }
}

impl SchemaContext {
    /// The tutoring-service views this deployment exposes.
    pub fn tutoring_views() -> Self {
        Self {
            relations: vec![
                RelationSchema {
                    name: "view_tts_users".to_string(),
                    description: "All registered users (teachers, students, admins)".to_string(),
                    columns: vec![
                        column("id", "uuid", "User id"),
                        column("name", "text", "Full name"),
                        column("email", "text", "Email address"),
                        column("role", "text", "One of: teacher, student, admin"),
                        column("is_active", "boolean", "Whether the account is active"),
                        column("created_at", "timestamp", "Registration time"),
                    ],
                },
                RelationSchema {
                    name: "view_tts_fees".to_string(),
                    description: "Fee items billed to students".to_string(),
                    columns: vec![
                        column("id", "uuid", "Fee id"),
                        column("student_name", "text", "Billed student"),
                        column("description", "text", "What the fee covers"),
                        column("amount", "numeric", "Fee amount"),
                        column("is_active", "boolean", "Whether the fee is currently due"),
                        column("due_date", "date", "Due date"),
                    ],
                },
                RelationSchema {
                    name: "view_tts_payments".to_string(),
                    description: "Payments received against fees".to_string(),
                    columns: vec![
                        column("id", "uuid", "Payment id"),
                        column("student_name", "text", "Paying student"),
                        column("amount", "numeric", "Paid amount"),
                        column("method", "text", "Payment method"),
                        column("paid_at", "timestamp", "Payment time"),
                    ],
                },
                RelationSchema {
                    name: "view_tts_lessons".to_string(),
                    description: "Scheduled and completed lessons".to_string(),
                    columns: vec![
                        column("id", "uuid", "Lesson id"),
                        column("teacher_name", "text", "Teacher"),
                        column("student_name", "text", "Student"),
                        column("subject", "text", "Subject taught"),
                        column("status", "text", "One of: scheduled, completed, cancelled"),
                        column("scheduled_at", "timestamp", "Lesson time"),
                    ],
                },
            ],
        }
    }

    pub fn relation_names(&self) -> Vec<String> {
        self.relations.iter().map(|r| r.name.clone()).collect()
    }

    /// Render the schema plus few-shot examples around the user question.
    pub fn build_prompt(&self, question: &str) -> String {
        let mut schema_lines = Vec::new();
        for relation in &self.relations {
            schema_lines.push(format!("- {} ({})", relation.name, relation.description));
            for col in &relation.columns {
                schema_lines.push(format!(
                    "    {} {} -- {}",
                    col.name, col.data_type, col.description
                ));
            }
        }

        format!(
            r#"You translate questions into SQL over read-only views.

Views:
{}

Rules:
- Output exactly one SELECT statement, nothing else.
- Only reference the views above.
- Use ILIKE with % wildcards for fuzzy name matching.
- Use COUNT(*) for "how many" questions.

Examples:
Q: How many teachers are there?
SQL: SELECT COUNT(*) as teacher_count FROM view_tts_users WHERE role = 'teacher'
Q: Show active fees, biggest first
SQL: SELECT * FROM view_tts_fees WHERE is_active = true ORDER BY amount DESC LIMIT 50
Q: How many users per role?
SQL: SELECT role, COUNT(*) as count FROM view_tts_users GROUP BY role

Q: {}
SQL:"#,
            schema_lines.join("\n"),
            question
        )
    }
}
