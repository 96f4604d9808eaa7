//! Beneficiary and staff profiles, beneficiary search, and the per-scope
//! snapshots the statistics roll-up reads.

use chrono::{DateTime, NaiveDate, Utc};
use klk_core::{Gender, Role, SponsorshipStatus};
use klk_stats::BeneficiarySnapshot;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use utoipa::ToSchema;

use crate::extractors::Pagination;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
pub struct Profile {
    pub user_id: i64,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub role: Role,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub county: Option<String>,
    pub school: Option<String>,
    pub education_level_id: Option<i64>,
    pub grade_class_id: Option<i64>,
    #[sqlx(try_from = "String")]
    #[schema(value_type = String)]
    pub sponsorship_status: SponsorshipStatus,
    pub sponsorship_start_date: Option<NaiveDate>,
    pub is_verified: bool,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub bio: Option<String>,
    pub registration_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn gender(&self) -> Option<Gender> {
        self.gender.as_deref().and_then(|g| g.parse().ok())
    }

    /// Whole years since the sponsorship started, or since registration.
    pub fn years_in_program(&self, today: NaiveDate) -> i64 {
        let start = self.sponsorship_start_date.unwrap_or(self.registration_date);
        ((today - start).num_days() / 365).max(0)
    }

    /// Active sponsorship that has already started.
    pub fn is_currently_sponsored(&self, today: NaiveDate) -> bool {
        self.sponsorship_status == SponsorshipStatus::Active
            && self.sponsorship_start_date.map_or(true, |d| d <= today)
    }
}

/// Fields accepted on create and on partial update. `None` means "leave alone".
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProfileFields {
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub county: Option<String>,
    pub school: Option<String>,
    pub sponsorship_status: Option<String>,
    pub sponsorship_start_date: Option<NaiveDate>,
    pub is_verified: Option<bool>,
    pub guardian_name: Option<String>,
    pub guardian_phone: Option<String>,
    pub bio: Option<String>,
}

impl ProfileFields {
    /// Reject unknown gender or sponsorship values.
    pub fn check(&self) -> Result<(), klk_core::ValidationError> {
        if let Some(g) = &self.gender {
            g.parse::<Gender>()?;
        }
        if let Some(s) = &self.sponsorship_status {
            s.parse::<SponsorshipStatus>()?;
        }
        Ok(())
    }
}

pub async fn insert(
    conn: &mut SqliteConnection,
    user_id: i64,
    role: Role,
    fields: &ProfileFields,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO profiles (user_id, role, phone, gender, date_of_birth, county, school,
             sponsorship_status, sponsorship_start_date, is_verified, guardian_name,
             guardian_phone, bio, registration_date, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, COALESCE(?, 'active'), ?, COALESCE(?, 0), ?, ?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(role.as_str())
    .bind(&fields.phone)
    .bind(&fields.gender)
    .bind(fields.date_of_birth)
    .bind(&fields.county)
    .bind(&fields.school)
    .bind(&fields.sponsorship_status)
    .bind(fields.sponsorship_start_date)
    .bind(fields.is_verified)
    .bind(&fields.guardian_name)
    .bind(&fields.guardian_phone)
    .bind(&fields.bio)
    .bind(now.date_naive())
    .bind(now)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn update(
    conn: &mut SqliteConnection,
    user_id: i64,
    fields: &ProfileFields,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE profiles SET
             phone = COALESCE(?, phone),
             gender = COALESCE(?, gender),
             date_of_birth = COALESCE(?, date_of_birth),
             county = COALESCE(?, county),
             school = COALESCE(?, school),
             sponsorship_status = COALESCE(?, sponsorship_status),
             sponsorship_start_date = COALESCE(?, sponsorship_start_date),
             is_verified = COALESCE(?, is_verified),
             guardian_name = COALESCE(?, guardian_name),
             guardian_phone = COALESCE(?, guardian_phone),
             bio = COALESCE(?, bio),
             updated_at = ?
         WHERE user_id = ?",
    )
    .bind(&fields.phone)
    .bind(&fields.gender)
    .bind(fields.date_of_birth)
    .bind(&fields.county)
    .bind(&fields.school)
    .bind(&fields.sponsorship_status)
    .bind(fields.sponsorship_start_date)
    .bind(fields.is_verified)
    .bind(&fields.guardian_name)
    .bind(&fields.guardian_phone)
    .bind(&fields.bio)
    .bind(now)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Move a profile to a level and grade (either may be cleared).
pub async fn set_placement(
    conn: &mut SqliteConnection,
    user_id: i64,
    education_level_id: Option<i64>,
    grade_class_id: Option<i64>,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE profiles SET education_level_id = ?, grade_class_id = ?, updated_at = ?
         WHERE user_id = ?",
    )
    .bind(education_level_id)
    .bind(grade_class_id)
    .bind(now)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// One row of the admin beneficiary list.
#[derive(Debug, Clone, Serialize, sqlx::FromRow, ToSchema)]
pub struct BeneficiaryRow {
    pub user_id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub phone: Option<String>,
    pub gender: Option<String>,
    pub county: Option<String>,
    pub school: Option<String>,
    pub sponsorship_status: String,
    pub is_verified: bool,
    pub registration_date: NaiveDate,
    pub education_level_key: Option<String>,
    pub education_level: Option<String>,
    pub grade_class_id: Option<i64>,
    pub grade: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
pub struct BeneficiaryFilter {
    /// Matches first/last name, email, username or school.
    pub search: Option<String>,
    /// Education level key.
    pub level: Option<String>,
    pub grade_id: Option<i64>,
    pub status: Option<String>,
}

const BENEFICIARY_SELECT: &str = "SELECT p.user_id, u.username, u.email, u.first_name, u.last_name,
        u.is_active, p.phone, p.gender, p.county, p.school, p.sponsorship_status, p.is_verified,
        p.registration_date, l.level_key AS education_level_key, l.title AS education_level,
        p.grade_class_id, g.name AS grade
     FROM profiles p
     JOIN users u ON u.id = p.user_id
     LEFT JOIN education_levels l ON l.id = p.education_level_id
     LEFT JOIN grade_classes g ON g.id = p.grade_class_id";

fn push_beneficiary_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &BeneficiaryFilter) {
    qb.push(" WHERE p.role = 'beneficiary'");
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = super::like_pattern(search);
        qb.push(" AND (");
        for (i, column) in ["u.first_name", "u.last_name", "u.email", "u.username", "p.school"]
            .iter()
            .enumerate()
        {
            if i > 0 {
                qb.push(" OR ");
            }
            qb.push(*column)
                .push(" LIKE ")
                .push_bind(pattern.clone())
                .push(" ESCAPE '\\'");
        }
        qb.push(")");
    }
    if let Some(level) = &filter.level {
        qb.push(" AND l.level_key = ").push_bind(level.clone());
    }
    if let Some(grade) = filter.grade_id {
        qb.push(" AND p.grade_class_id = ").push_bind(grade);
    }
    if let Some(status) = &filter.status {
        qb.push(" AND p.sponsorship_status = ").push_bind(status.clone());
    }
}

pub async fn list_beneficiaries(
    conn: &mut SqliteConnection,
    filter: &BeneficiaryFilter,
    page: &Pagination,
) -> Result<(Vec<BeneficiaryRow>, i64), sqlx::Error> {
    let mut count = QueryBuilder::<Sqlite>::new(
        "SELECT COUNT(*) FROM profiles p
         JOIN users u ON u.id = p.user_id
         LEFT JOIN education_levels l ON l.id = p.education_level_id",
    );
    push_beneficiary_filter(&mut count, filter);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *conn).await?;

    let mut qb = QueryBuilder::<Sqlite>::new(BENEFICIARY_SELECT);
    push_beneficiary_filter(&mut qb, filter);
    qb.push(" ORDER BY p.registration_date DESC, p.user_id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
    let rows = qb
        .build_query_as::<BeneficiaryRow>()
        .fetch_all(&mut *conn)
        .await?;
    Ok((rows, total))
}

/// Beneficiaries placed in one grade, for the grade roster.
pub async fn beneficiaries_in_grade(
    conn: &mut SqliteConnection,
    grade_class_id: i64,
) -> Result<Vec<BeneficiaryRow>, sqlx::Error> {
    sqlx::query_as::<_, BeneficiaryRow>(&format!(
        "{BENEFICIARY_SELECT} WHERE p.role = 'beneficiary' AND p.grade_class_id = ?
         ORDER BY u.last_name, u.first_name"
    ))
    .bind(grade_class_id)
    .fetch_all(&mut *conn)
    .await
}

/// Which scope a snapshot covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Level(i64),
    Grade(i64),
    All,
}

impl Scope {
    pub(crate) fn condition(&self) -> &'static str {
        match self {
            Scope::Level(_) => "p.role = 'beneficiary' AND p.education_level_id = ?",
            Scope::Grade(_) => "p.role = 'beneficiary' AND p.grade_class_id = ?",
            Scope::All => "p.role = 'beneficiary' AND ? IS NULL",
        }
    }

    pub(crate) fn bind_value(&self) -> Option<i64> {
        match self {
            Scope::Level(id) | Scope::Grade(id) => Some(*id),
            Scope::All => None,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    user_id: i64,
    gender: Option<String>,
    #[sqlx(try_from = "String")]
    sponsorship_status: SponsorshipStatus,
    is_verified: bool,
    registration_date: NaiveDate,
    county: Option<String>,
}

pub async fn snapshots(
    conn: &mut SqliteConnection,
    scope: Scope,
) -> Result<Vec<BeneficiarySnapshot>, sqlx::Error> {
    let rows = sqlx::query_as::<_, SnapshotRow>(&format!(
        "SELECT p.user_id, p.gender, p.sponsorship_status, p.is_verified, p.registration_date,
                p.county
         FROM profiles p WHERE {}",
        scope.condition()
    ))
    .bind(scope.bind_value())
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| BeneficiarySnapshot {
            user_id: r.user_id,
            gender: r.gender.and_then(|g| g.parse().ok()),
            sponsorship_status: r.sponsorship_status,
            is_verified: r.is_verified,
            joined_on: r.registration_date,
            county: r.county,
        })
        .collect())
}

/// Placement of one user, used to find which scopes to refresh.
pub async fn placement(
    conn: &mut SqliteConnection,
    user_id: i64,
) -> Result<Option<(Option<i64>, Option<i64>)>, sqlx::Error> {
    sqlx::query_as::<_, (Option<i64>, Option<i64>)>(
        "SELECT education_level_id, grade_class_id FROM profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(&mut *conn)
    .await
}

/// Counts of beneficiaries by sponsorship status and verification.
#[derive(Debug, Clone, Default, Serialize, sqlx::FromRow, ToSchema)]
pub struct BeneficiaryCounts {
    pub total: i64,
    pub active: i64,
    pub verified: i64,
    pub new_this_month: i64,
}

pub async fn beneficiary_counts(
    conn: &mut SqliteConnection,
    month_start: NaiveDate,
) -> Result<BeneficiaryCounts, sqlx::Error> {
    sqlx::query_as::<_, BeneficiaryCounts>(
        "SELECT COUNT(*) AS total,
                COALESCE(SUM(sponsorship_status = 'active'), 0) AS active,
                COALESCE(SUM(is_verified), 0) AS verified,
                COALESCE(SUM(registration_date >= ?), 0) AS new_this_month
         FROM profiles WHERE role = 'beneficiary'",
    )
    .bind(month_start)
    .fetch_one(&mut *conn)
    .await
}
