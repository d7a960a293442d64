//! Generic CRUD over any [`ResourceDef`], backed by a [`ResourceStore`].

use super::validation::RequestValidator;
use crate::error::AppError;
use crate::extractors::AuthUser;
use crate::geo::{self, Geocoder};
use crate::model::{slugify, Record, ResourceDef};
use crate::query::{Filter, GeoWithin, QueryShaper};
use crate::response::ResultEnvelope;
use crate::store::{FindQuery, ResourceStore};
use serde_json::Value;
use uuid::Uuid;

/// Parse a path id. Anything that is not a UUID is reported as a missing resource.
pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::MalformedId(raw.to_string()))
}

fn owned_by(def: &ResourceDef, record: &Record, user: &AuthUser) -> bool {
    if user.is_admin() {
        return true;
    }
    match def.owner_field {
        Some(field) => record.get(field).and_then(Value::as_str) == Some(user.id.as_str()),
        None => true,
    }
}

fn into_record(body: Value) -> Result<Record, AppError> {
    match body {
        Value::Object(map) => Ok(map),
        _ => Err(AppError::BadRequest("Request body must be a JSON object".into())),
    }
}

pub struct CrudService;

impl CrudService {
    /// Shaped listing. `scope` conditions are added to the ones from the query string.
    pub async fn list(
        store: &dyn ResourceStore,
        def: &ResourceDef,
        params: &[(String, String)],
        scope: Filter,
    ) -> Result<ResultEnvelope, AppError> {
        let mut shaped = QueryShaper::default().shape(params);
        shaped.filter = std::mem::take(&mut shaped.filter).coerce(def);
        for condition in scope.conditions() {
            shaped.filter.push(condition.clone());
        }
        let total = store.count(def, &shaped.filter).await?;
        let spec = shaped.into_spec(total);
        let records = store.find(def, &FindQuery::from_spec(&spec, def.includes)).await?;
        tracing::debug!(resource = def.name, total, returned = records.len(), "listed");
        Ok(ResultEnvelope::new(records, spec.pagination))
    }

    pub async fn read(store: &dyn ResourceStore, def: &ResourceDef, id: &str) -> Result<Record, AppError> {
        let uuid = parse_id(id)?;
        store
            .find_by_id(def, uuid, def.includes)
            .await?
            .ok_or_else(|| AppError::not_found(def.label, id))
    }

    /// Validate and insert. The caller becomes the owner; slug and location are derived.
    pub async fn create(
        store: &dyn ResourceStore,
        geocoder: &dyn Geocoder,
        def: &ResourceDef,
        user: &AuthUser,
        body: Value,
    ) -> Result<Record, AppError> {
        user.authorize(def)?;
        let mut doc = RequestValidator::sanitize(def, into_record(body)?);
        if let Some(owner) = def.owner_field {
            doc.insert(owner.to_string(), Value::String(user.id.clone()));
            if let Some(max) = def.max_per_owner.filter(|_| !user.is_admin()) {
                let owned = store.count(def, &Filter::new().eq(owner, user.id.clone())).await?;
                if owned >= max {
                    return Err(AppError::BadRequest(format!(
                        "The user with ID {} has already published a {}",
                        user.id,
                        def.label.to_lowercase()
                    )));
                }
            }
        }
        RequestValidator::apply_defaults(def, &mut doc);
        RequestValidator::validate(def, &doc)?;
        derive_fields(geocoder, def, &mut doc, Derive::Create).await?;
        let created = store.create(def, doc).await?;
        tracing::info!(resource = def.name, id = ?created.get("id"), user = %user.id, "created");
        Ok(created)
    }

    /// Create a child record linked to an existing parent the caller owns.
    #[allow(clippy::too_many_arguments)]
    pub async fn create_nested(
        store: &dyn ResourceStore,
        geocoder: &dyn Geocoder,
        parent: &ResourceDef,
        parent_id: &str,
        child: &ResourceDef,
        link_field: &str,
        user: &AuthUser,
        body: Value,
    ) -> Result<Record, AppError> {
        user.authorize(child)?;
        let missing_parent =
            || AppError::NotFound(format!("No {} with the id of {}", parent.label.to_lowercase(), parent_id));
        let uuid = Uuid::parse_str(parent_id.trim()).map_err(|_| missing_parent())?;
        let parent_record = store.find_by_id(parent, uuid, &[]).await?.ok_or_else(missing_parent)?;
        if !owned_by(parent, &parent_record, user) {
            return Err(AppError::Unauthorized(format!(
                "User {} is not authorized to add a {} to {} {}",
                user.id,
                child.label.to_lowercase(),
                parent.label.to_lowercase(),
                parent_id
            )));
        }
        let mut doc = into_record(body)?;
        doc.insert(link_field.to_string(), Value::String(uuid.to_string()));
        Self::create(store, geocoder, child, user, Value::Object(doc)).await
    }

    /// Partial update; only supplied fields are validated.
    pub async fn update(
        store: &dyn ResourceStore,
        geocoder: &dyn Geocoder,
        def: &ResourceDef,
        user: &AuthUser,
        id: &str,
        body: Value,
    ) -> Result<Record, AppError> {
        user.authorize(def)?;
        let uuid = parse_id(id)?;
        let existing = store
            .find_by_id(def, uuid, &[])
            .await?
            .ok_or_else(|| AppError::not_found(def.label, id))?;
        ensure_owner(def, &existing, user, "update")?;
        let mut changes = RequestValidator::sanitize(def, into_record(body)?);
        changes.retain(|k, _| !def.is_fixed_after_create(k));
        RequestValidator::validate_partial(def, &changes)?;
        derive_fields(geocoder, def, &mut changes, Derive::Update).await?;
        let updated = store
            .update_by_id(def, uuid, changes)
            .await?
            .ok_or_else(|| AppError::not_found(def.label, id))?;
        tracing::info!(resource = def.name, %uuid, user = %user.id, "updated");
        Ok(updated)
    }

    /// Delete the record and every record cascading from it.
    pub async fn delete(
        store: &dyn ResourceStore,
        def: &ResourceDef,
        user: &AuthUser,
        id: &str,
    ) -> Result<(), AppError> {
        user.authorize(def)?;
        let uuid = parse_id(id)?;
        let existing = store
            .find_by_id(def, uuid, &[])
            .await?
            .ok_or_else(|| AppError::not_found(def.label, id))?;
        ensure_owner(def, &existing, user, "delete")?;
        for cascade in def.cascades {
            let removed = store
                .delete_many(cascade.related, &Filter::new().eq(cascade.foreign, uuid.to_string()))
                .await?;
            tracing::debug!(resource = cascade.related.name, removed, "cascaded delete");
        }
        if !store.delete_by_id(def, uuid).await? {
            return Err(AppError::not_found(def.label, id));
        }
        tracing::info!(resource = def.name, %uuid, user = %user.id, "deleted");
        Ok(())
    }

    /// Records whose location lies within `distance` miles of the postal code.
    pub async fn within_radius(
        store: &dyn ResourceStore,
        geocoder: &dyn Geocoder,
        def: &ResourceDef,
        zipcode: &str,
        distance: &str,
    ) -> Result<Vec<Record>, AppError> {
        let field = def
            .geocode
            .map(|g| g.target)
            .ok_or_else(|| AppError::BadRequest(format!("{} do not support radius search", def.label)))?;
        let miles: f64 = distance
            .trim()
            .parse()
            .ok()
            .filter(|d: &f64| d.is_finite() && *d >= 0.0)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid distance: {}", distance)))?;
        let center = geocoder
            .geocode(zipcode)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Location for zipcode {} was not found", zipcode)))?;
        let filter = Filter::new().within(GeoWithin {
            field: field.to_string(),
            longitude: center.longitude,
            latitude: center.latitude,
            radius: geo::radius_radians(miles),
        });
        let records = store.find(def, &FindQuery::all(filter)).await?;
        tracing::debug!(zipcode, miles, found = records.len(), "radius search");
        Ok(records)
    }
}

fn ensure_owner(def: &ResourceDef, record: &Record, user: &AuthUser, action: &str) -> Result<(), AppError> {
    if owned_by(def, record, user) {
        Ok(())
    } else {
        Err(AppError::Unauthorized(format!(
            "User {} is not authorized to {} this {}",
            user.id,
            action,
            def.label.to_lowercase()
        )))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Derive {
    Create,
    Update,
}

/// Slug from the source field and GeoJSON location from the address, when supplied. On
/// update, an address that cannot be geocoded clears the stored location.
async fn derive_fields(geocoder: &dyn Geocoder, def: &ResourceDef, doc: &mut Record, mode: Derive) -> Result<(), AppError> {
    if let Some(slug) = def.slug {
        if let Some(source) = doc.get(slug.source).and_then(Value::as_str) {
            let value = slugify(source);
            doc.insert(slug.target.to_string(), Value::String(value));
        }
    }
    let Some(derived) = def.geocode else { return Ok(()) };
    let Some(address) = doc.get(derived.source).and_then(Value::as_str).map(str::to_string) else {
        return Ok(());
    };
    let point = if geocoder.is_enabled() {
        let point = geocoder.geocode(&address).await?;
        if point.is_none() {
            tracing::warn!(resource = def.name, %address, "address could not be geocoded");
        }
        point
    } else {
        tracing::warn!(resource = def.name, "geocoder not configured; location not set");
        None
    };
    match point {
        Some(point) => {
            doc.insert(derived.target.to_string(), point.to_geojson());
        }
        None if mode == Derive::Update => {
            doc.insert(derived.target.to_string(), Value::Null);
        }
        None => {}
    }
    Ok(())
}
