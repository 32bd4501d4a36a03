use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{DecksRepo, RepoError},
    domain::deck::{BrandFields, Deck, DeckRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const DECK_COLUMNS: &str = "id, workspace_id, theme_id, brand_primary_color, \
    brand_secondary_color, brand_logo_url, document, updated_at";

#[derive(sqlx::FromRow)]
struct DeckRow {
    id: Uuid,
    workspace_id: Uuid,
    theme_id: Option<String>,
    brand_primary_color: Option<String>,
    brand_secondary_color: Option<String>,
    brand_logo_url: Option<String>,
    document: JsonValue,
    updated_at: OffsetDateTime,
}

impl TryFrom<DeckRow> for DeckRecord {
    type Error = RepoError;

    fn try_from(row: DeckRow) -> Result<Self, Self::Error> {
        let document: Deck =
            serde_json::from_value(row.document).map_err(|err| RepoError::Integrity {
                message: format!("deck `{}` has a malformed document: {err}", row.id),
            })?;

        Ok(Self {
            id: row.id,
            workspace_id: row.workspace_id,
            theme_id: row.theme_id,
            brand: BrandFields {
                primary_color: row.brand_primary_color,
                secondary_color: row.brand_secondary_color,
                logo_url: row.brand_logo_url,
            },
            document,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl DecksRepo for PostgresRepositories {
    async fn find_deck_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<DeckRecord>, RepoError> {
        let sql = format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = $1 AND workspace_id = $2");
        let row = sqlx::query_as::<_, DeckRow>(&sql)
            .bind(id)
            .bind(workspace_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(DeckRecord::try_from).transpose()
    }

    async fn find_deck(&self, id: Uuid) -> Result<Option<DeckRecord>, RepoError> {
        let sql = format!("SELECT {DECK_COLUMNS} FROM decks WHERE id = $1");
        let row = sqlx::query_as::<_, DeckRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(DeckRecord::try_from).transpose()
    }
}
