//! Content API for Shopping product entries: `sc:`/`scp:` attributes,
//! `app:control` destinations and the read-only performance report.

use super::tree::Element;

/// Structured content namespace (`sc:`).
pub const SC_NAMESPACE: &str = "http://schemas.google.com/structuredcontent/2009";
/// Product attribute namespace (`scp:`).
pub const SCP_NAMESPACE: &str = "http://schemas.google.com/structuredcontent/2009/products";
/// Atom publishing namespace (`app:`), home of `app:control`.
pub const APP_NAMESPACE: &str = "http://www.w3.org/2007/app";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductNamespace {
    Sc,
    Scp,
}

impl ProductNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            ProductNamespace::Sc => "sc",
            ProductNamespace::Scp => "scp",
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            ProductNamespace::Sc => SC_NAMESPACE,
            ProductNamespace::Scp => SCP_NAMESPACE,
        }
    }

    fn of(element: &Element) -> Option<Self> {
        match element.namespace.as_deref() {
            Some(SC_NAMESPACE) => Some(ProductNamespace::Sc),
            Some(SCP_NAMESPACE) => Some(ProductNamespace::Scp),
            _ => None,
        }
    }
}

/// A single-valued product attribute such as `sc:target_country` or
/// `scp:price unit="usd"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductAttribute {
    pub namespace: ProductNamespace,
    pub name: String,
    pub value: String,
    pub unit: Option<String>,
}

/// `sc:attribute`: a merchant-defined attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CustomAttribute {
    pub name: String,
    pub kind: Option<String>,
    pub unit: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationStatus {
    pub dest: String,
    pub status: String,
}

/// `sc:warning`, reported by the server inside `app:control`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Warning {
    pub code: Option<String>,
    pub domain: Option<String>,
    pub location: Option<String>,
    pub internal_reason: Option<String>,
}

/// `app:control` as used by product entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductControl {
    pub draft: bool,
    pub required_destinations: Vec<String>,
    pub validate_destinations: Vec<String>,
    pub excluded_destinations: Vec<String>,
    pub statuses: Vec<DestinationStatus>,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datapoint {
    pub date: String,
    pub clicks: Option<u64>,
    pub paid_clicks: Option<u64>,
}

/// `sc:performance`: click statistics, present when the item query asked
/// for a performance range.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Performance {
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProductExtensions {
    pub attributes: Vec<ProductAttribute>,
    pub custom_attributes: Vec<CustomAttribute>,
    pub control: Option<ProductControl>,
    pub performance: Option<Performance>,
}

impl ProductExtensions {
    /// First value of the named attribute in either namespace.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attribute(name).map(|a| a.value.as_str())
    }

    pub fn attribute(&self, name: &str) -> Option<&ProductAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Replaces every value of `name` with a single one.
    pub fn set(&mut self, namespace: ProductNamespace, name: &str, value: impl Into<String>) {
        self.set_with_unit(namespace, name, value, None);
    }

    pub fn set_with_unit(
        &mut self,
        namespace: ProductNamespace,
        name: &str,
        value: impl Into<String>,
        unit: Option<&str>,
    ) {
        self.attributes.retain(|a| a.name != name);
        self.attributes.push(ProductAttribute {
            namespace,
            name: name.to_string(),
            value: value.into(),
            unit: unit.map(str::to_string),
        });
    }

    pub fn product_id(&self) -> Option<&str> {
        self.get("id")
    }

    pub fn target_country(&self) -> Option<&str> {
        self.get("target_country")
    }

    pub fn content_language(&self) -> Option<&str> {
        self.get("content_language")
    }

    /// `scp:price` value and currency unit.
    pub fn price(&self) -> Option<(&str, Option<&str>)> {
        self.attribute("price")
            .map(|a| (a.value.as_str(), a.unit.as_deref()))
    }

    /// `sc:adult`, an xsd boolean.
    pub fn adult(&self) -> bool {
        self.get("adult") == Some("true")
    }

    /// `scp:featured_product`, sent as `y` or `n`.
    pub fn featured_product(&self) -> bool {
        self.get("featured_product") == Some("y")
    }

    pub fn set_featured_product(&mut self, featured: bool) {
        self.set(
            ProductNamespace::Scp,
            "featured_product",
            if featured { "y" } else { "n" },
        );
    }

    /// Collects product elements among an entry's children, `None` when
    /// the entry carries none.
    pub(crate) fn from_entry(entry: &Element) -> Option<Self> {
        let mut product = ProductExtensions::default();
        let mut found = false;

        for child in &entry.children {
            if child.in_namespace(APP_NAMESPACE) && child.name == "control" {
                product.control = Some(control(child));
                found = true;
                continue;
            }
            let Some(namespace) = ProductNamespace::of(child) else {
                continue;
            };
            found = true;
            match (namespace, child.name.as_str()) {
                (ProductNamespace::Sc, "attribute") => match child.attr("name") {
                    Some(name) => product.custom_attributes.push(CustomAttribute {
                        name: name.to_string(),
                        kind: owned(child.attr("type")),
                        unit: owned(child.attr("unit")),
                        value: child.text.trim().to_string(),
                    }),
                    None => tracing::debug!("Ignoring sc:attribute without a name"),
                },
                (ProductNamespace::Sc, "performance") => {
                    product.performance = Some(performance(child));
                }
                _ => product.attributes.push(ProductAttribute {
                    namespace,
                    name: child.name.clone(),
                    value: child.text.trim().to_string(),
                    unit: owned(child.attr("unit")),
                }),
            }
        }

        found.then_some(product)
    }
}

fn control(element: &Element) -> ProductControl {
    let mut control = ProductControl::default();
    for child in &element.children {
        let dest = || child.attr("dest").map(str::to_string);
        match child.name.as_str() {
            "draft" => control.draft = child.text.trim() == "yes",
            "required_destination" => control.required_destinations.extend(dest()),
            "validate_destination" => control.validate_destinations.extend(dest()),
            "excluded_destination" => control.excluded_destinations.extend(dest()),
            "status" => {
                if let (Some(dest), Some(status)) = (child.attr("dest"), child.attr("status")) {
                    control.statuses.push(DestinationStatus {
                        dest: dest.to_string(),
                        status: status.to_string(),
                    });
                }
            }
            "warnings" => control.warnings = child.children_named("warning").map(warning).collect(),
            _ => {}
        }
    }
    control
}

fn warning(element: &Element) -> Warning {
    Warning {
        code: element.child_text("code"),
        domain: element.child_text("domain"),
        location: element.child_text("location"),
        internal_reason: element.child_text("internal_reason"),
    }
}

fn performance(element: &Element) -> Performance {
    Performance {
        datapoints: element
            .children_named("datapoint")
            .filter_map(|point| {
                Some(Datapoint {
                    date: point.attr("date")?.to_string(),
                    clicks: number(point.attr("clicks")),
                    paid_clicks: number(point.attr("paid_clicks")),
                })
            })
            .collect(),
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn number(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::parse_entry;
    use pretty_assertions::assert_eq;

    const PRODUCT_ENTRY: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<entry xmlns="http://www.w3.org/2005/Atom"
       xmlns:app="http://www.w3.org/2007/app"
       xmlns:sc="http://schemas.google.com/structuredcontent/2009"
       xmlns:scp="http://schemas.google.com/structuredcontent/2009/products">
  <id>https://content.googleapis.com/content/v1/1234/items/products/generic/online:en:US:sku-1</id>
  <title type="text">Red Mug</title>
  <sc:id>sku-1</sc:id>
  <sc:target_country>US</sc:target_country>
  <sc:content_language>en</sc:content_language>
  <sc:adult>false</sc:adult>
  <scp:author>Someone Else</scp:author>
  <scp:price unit="usd">12.50</scp:price>
  <scp:featured_product>y</scp:featured_product>
  <sc:attribute name="glaze" type="text">matte</sc:attribute>
  <app:control>
    <sc:required_destination dest="ProductSearch"/>
    <sc:excluded_destination dest="CommerceSearch"/>
    <sc:status dest="ProductSearch" status="disapproved"/>
    <sc:warnings>
      <sc:warning>
        <sc:code>validation/missing_recommended</sc:code>
        <sc:domain>ProductSearch</sc:domain>
        <sc:location>google_product_category</sc:location>
        <sc:internal_reason>Recommended attribute missing</sc:internal_reason>
      </sc:warning>
    </sc:warnings>
  </app:control>
  <sc:performance>
    <sc:datapoint date="2011-03-01" clicks="7" paid_clicks="2"/>
    <sc:datapoint date="2011-03-02" clicks="3" paid_clicks="0"/>
  </sc:performance>
</entry>"#;

    #[test]
    fn test_product_entry_parsed() {
        let entry = parse_entry(PRODUCT_ENTRY).unwrap();
        let product = entry.extensions.product.expect("product extensions");

        assert_eq!(product.product_id(), Some("sku-1"));
        assert_eq!(product.target_country(), Some("US"));
        assert_eq!(product.content_language(), Some("en"));
        assert_eq!(product.price(), Some(("12.50", Some("usd"))));
        assert!(!product.adult());
        assert!(product.featured_product());
        assert_eq!(product.attribute("author").unwrap().namespace, ProductNamespace::Scp);
        assert_eq!(
            product.custom_attributes,
            vec![CustomAttribute {
                name: "glaze".to_string(),
                kind: Some("text".to_string()),
                unit: None,
                value: "matte".to_string(),
            }]
        );

        let control = product.control.unwrap();
        assert_eq!(control.required_destinations, vec!["ProductSearch"]);
        assert_eq!(control.excluded_destinations, vec!["CommerceSearch"]);
        assert_eq!(control.statuses[0].status, "disapproved");
        assert_eq!(
            control.warnings,
            vec![Warning {
                code: Some("validation/missing_recommended".to_string()),
                domain: Some("ProductSearch".to_string()),
                location: Some("google_product_category".to_string()),
                internal_reason: Some("Recommended attribute missing".to_string()),
            }]
        );

        let performance = product.performance.unwrap();
        assert_eq!(performance.datapoints.len(), 2);
        assert_eq!(performance.datapoints[0].clicks, Some(7));
        assert_eq!(performance.datapoints[0].paid_clicks, Some(2));
    }

    #[test]
    fn test_product_elements_do_not_shadow_atom() {
        let entry = parse_entry(PRODUCT_ENTRY).unwrap();

        assert_eq!(
            entry.id.as_deref(),
            Some("https://content.googleapis.com/content/v1/1234/items/products/generic/online:en:US:sku-1")
        );
        assert!(entry.authors.is_empty());
        assert!(entry.extensions.who.is_empty());
    }

    #[test]
    fn test_plain_entry_has_no_product() {
        let entry = parse_entry(b"<entry><title>x</title></entry>").unwrap();
        assert_eq!(entry.extensions.product, None);
    }

    #[test]
    fn test_set_replaces_existing_value() {
        let mut product = ProductExtensions::default();
        product.set(ProductNamespace::Sc, "target_country", "US");
        product.set(ProductNamespace::Sc, "target_country", "GB");
        product.set_featured_product(false);

        assert_eq!(product.target_country(), Some("GB"));
        assert_eq!(product.attributes.len(), 2);
        assert!(!product.featured_product());
    }
}
