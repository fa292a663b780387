// Per-portal listing payloads

use realty_core::domain::{Portal, PortalSettings, Property};
use serde_json::{json, Map, Value};

/// Build the JSON body a portal expects for a listing.
///
/// Free-form `settings.options` are merged at the top level without
/// overriding fields built from the property.
pub fn listing_payload(portal: Portal, property: &Property, settings: &PortalSettings) -> Value {
    let mut body = match portal {
        Portal::Idealista => json!({
            "externalReference": property.reference,
            "operation": "sale",
            "price": { "amount": property.price, "currency": "EUR" },
            "description": property.title,
            "features": property.attributes,
            "contactAccount": settings.account_id,
        }),
        Portal::Fotocasa => json!({
            "ExternalId": property.reference,
            "Title": property.title,
            "Price": property.price,
            "Attributes": property.attributes,
            "AgencyId": settings.account_id,
        }),
        Portal::Habitaclia => json!({
            "referencia": property.reference,
            "titulo": property.title,
            "precio": property.price,
            "caracteristicas": property.attributes,
            "cliente": settings.account_id,
        }),
        Portal::AgencyWebsite => json!({
            "id": property.id,
            "reference": property.reference,
            "title": property.title,
            "price": property.price,
            "attributes": property.attributes,
            "published": true,
        }),
    };

    if let Value::Object(fields) = &mut body {
        merge_options(fields, &settings.options);
    }
    body
}

fn merge_options(fields: &mut Map<String, Value>, options: &Map<String, Value>) {
    for (key, value) in options {
        fields.entry(key.clone()).or_insert_with(|| value.clone());
    }
}

/// Portal-side key the listing is addressed by in update/unpublish URLs
pub(crate) fn listing_key(portal: Portal, property: &Property) -> &str {
    match portal {
        Portal::AgencyWebsite => &property.id,
        _ => &property.reference,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property() -> Property {
        Property {
            id: "p1".into(),
            reference: "REF-001".into(),
            title: "Sunny flat in Gracia".into(),
            price: 320_000.0,
            attributes: json!({ "rooms": 3, "surface": 85 }),
        }
    }

    fn settings() -> PortalSettings {
        PortalSettings {
            account_id: Some("acct-9".into()),
            options: Map::new(),
        }
    }

    #[test]
    fn test_each_portal_uses_its_own_field_names() {
        let property = property();
        let settings = settings();

        let idealista = listing_payload(Portal::Idealista, &property, &settings);
        assert_eq!(idealista["externalReference"], "REF-001");
        assert_eq!(idealista["price"]["amount"], 320_000.0);
        assert_eq!(idealista["contactAccount"], "acct-9");

        let fotocasa = listing_payload(Portal::Fotocasa, &property, &settings);
        assert_eq!(fotocasa["ExternalId"], "REF-001");
        assert_eq!(fotocasa["AgencyId"], "acct-9");

        let habitaclia = listing_payload(Portal::Habitaclia, &property, &settings);
        assert_eq!(habitaclia["precio"], 320_000.0);
        assert_eq!(habitaclia["caracteristicas"]["rooms"], 3);

        let website = listing_payload(Portal::AgencyWebsite, &property, &settings);
        assert_eq!(website["id"], "p1");
        assert_eq!(website["published"], true);
    }

    #[test]
    fn test_options_do_not_override_listing_fields() {
        let mut settings = settings();
        settings.options.insert("highlight".into(), json!(true));
        settings.options.insert("Title".into(), json!("spoofed"));

        let body = listing_payload(Portal::Fotocasa, &property(), &settings);
        assert_eq!(body["highlight"], true);
        assert_eq!(body["Title"], "Sunny flat in Gracia");
    }

    #[test]
    fn test_listing_key() {
        let property = property();
        assert_eq!(listing_key(Portal::Idealista, &property), "REF-001");
        assert_eq!(listing_key(Portal::AgencyWebsite, &property), "p1");
    }
}
