use super::extensions::{GdExtensions, GD_NAMESPACE};
use super::model::{AtomEntry, AtomPerson, TextConstruct};
use super::shopping::{ProductExtensions, APP_NAMESPACE, SCP_NAMESPACE, SC_NAMESPACE};
use super::{AtomError, ATOM_NAMESPACE};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

impl AtomEntry {
    /// Serializes the entry as a standalone `<entry>` document, suitable as
    /// a POST or PUT body.
    pub fn to_xml(&self) -> Result<String, AtomError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("entry");
        root.push_attribute(("xmlns", ATOM_NAMESPACE));
        if self.extensions.has_kinds() {
            root.push_attribute(("xmlns:gd", GD_NAMESPACE));
        }
        if self.extensions.product.is_some() {
            root.push_attribute(("xmlns:app", APP_NAMESPACE));
            root.push_attribute(("xmlns:sc", SC_NAMESPACE));
            root.push_attribute(("xmlns:scp", SCP_NAMESPACE));
        }
        write(&mut writer, Event::Start(root))?;

        if let Some(id) = &self.id {
            text_element(&mut writer, BytesStart::new("id"), id)?;
        }
        if let Some(title) = &self.title {
            text_construct(&mut writer, "title", title)?;
        }
        if let Some(summary) = &self.summary {
            text_construct(&mut writer, "summary", summary)?;
        }
        if let Some(content) = &self.content {
            let mut start = BytesStart::new("content");
            if let Some(media_type) = &content.media_type {
                start.push_attribute(("type", media_type.as_str()));
            }
            match &content.src {
                Some(src) => {
                    start.push_attribute(("src", src.as_str()));
                    write(&mut writer, Event::Empty(start))?;
                }
                None => text_element(&mut writer, start, &content.text)?,
            }
        }
        for (name, value) in [("published", self.published), ("updated", self.updated)] {
            if let Some(value) = value {
                text_element(&mut writer, BytesStart::new(name), &timestamp(value))?;
            }
        }
        for link in &self.links {
            let mut start = BytesStart::new("link");
            if let Some(rel) = &link.rel {
                start.push_attribute(("rel", rel.as_str()));
            }
            if let Some(media_type) = &link.media_type {
                start.push_attribute(("type", media_type.as_str()));
            }
            start.push_attribute(("href", link.href.as_str()));
            if let Some(title) = &link.title {
                start.push_attribute(("title", title.as_str()));
            }
            write(&mut writer, Event::Empty(start))?;
        }
        for category in &self.categories {
            let mut start = BytesStart::new("category");
            if let Some(scheme) = &category.scheme {
                start.push_attribute(("scheme", scheme.as_str()));
            }
            start.push_attribute(("term", category.term.as_str()));
            if let Some(label) = &category.label {
                start.push_attribute(("label", label.as_str()));
            }
            write(&mut writer, Event::Empty(start))?;
        }
        for author in &self.authors {
            person(&mut writer, "author", author)?;
        }
        for contributor in &self.contributors {
            person(&mut writer, "contributor", contributor)?;
        }
        extensions(&mut writer, &self.extensions)?;

        write(&mut writer, Event::End(BytesEnd::new("entry")))?;

        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|e| AtomError::Write(e.to_string()))
    }
}

fn write(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), AtomError> {
    writer
        .write_event(event)
        .map_err(|e| AtomError::Write(e.to_string()))
}

fn text_element(writer: &mut XmlWriter, start: BytesStart<'_>, text: &str) -> Result<(), AtomError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    write(writer, Event::Start(start))?;
    write(writer, Event::Text(BytesText::new(text)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn text_construct(writer: &mut XmlWriter, name: &str, text: &TextConstruct) -> Result<(), AtomError> {
    let mut start = BytesStart::new(name);
    start.push_attribute(("type", text.kind.as_str()));
    text_element(writer, start, &text.text)
}

fn person(writer: &mut XmlWriter, name: &str, person: &AtomPerson) -> Result<(), AtomError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    text_element(writer, BytesStart::new("name"), &person.name)?;
    if let Some(email) = &person.email {
        text_element(writer, BytesStart::new("email"), email)?;
    }
    if let Some(uri) = &person.uri {
        text_element(writer, BytesStart::new("uri"), uri)?;
    }
    write(writer, Event::End(BytesEnd::new(name)))
}

fn extensions(writer: &mut XmlWriter, ext: &GdExtensions) -> Result<(), AtomError> {
    for who in &ext.who {
        let mut start = BytesStart::new("gd:who");
        push_opt(&mut start, "rel", who.rel.as_deref());
        push_opt(&mut start, "valueString", who.value_string.as_deref());
        push_opt(&mut start, "email", who.email.as_deref());
        write(writer, Event::Empty(start))?;
    }
    for when in &ext.when {
        let mut start = BytesStart::new("gd:when");
        start.push_attribute(("startTime", when.start_time.as_str()));
        push_opt(&mut start, "endTime", when.end_time.as_deref());
        push_opt(&mut start, "valueString", when.value_string.as_deref());
        write(writer, Event::Empty(start))?;
    }
    if let Some(rating) = &ext.rating {
        let mut start = BytesStart::new("gd:rating");
        push_opt(&mut start, "value", rating.value.map(|v| v.to_string()).as_deref());
        start.push_attribute(("min", rating.min.to_string().as_str()));
        start.push_attribute(("max", rating.max.to_string().as_str()));
        write(writer, Event::Empty(start))?;
    }
    for feed_link in &ext.feed_links {
        let mut start = BytesStart::new("gd:feedLink");
        push_opt(&mut start, "rel", feed_link.rel.as_deref());
        push_opt(&mut start, "href", feed_link.href.as_deref());
        if feed_link.read_only {
            start.push_attribute(("readOnly", "true"));
        }
        write(writer, Event::Empty(start))?;
    }
    if let Some(product) = &ext.product {
        product_elements(writer, product)?;
    }
    Ok(())
}

/// Statuses, warnings and performance are server-assigned and not written.
fn product_elements(writer: &mut XmlWriter, product: &ProductExtensions) -> Result<(), AtomError> {
    for attribute in &product.attributes {
        let name = format!("{}:{}", attribute.namespace.prefix(), attribute.name);
        let mut start = BytesStart::new(name.as_str());
        push_opt(&mut start, "unit", attribute.unit.as_deref());
        text_element(writer, start, &attribute.value)?;
    }
    for custom in &product.custom_attributes {
        let mut start = BytesStart::new("sc:attribute");
        start.push_attribute(("name", custom.name.as_str()));
        push_opt(&mut start, "type", custom.kind.as_deref());
        push_opt(&mut start, "unit", custom.unit.as_deref());
        text_element(writer, start, &custom.value)?;
    }
    if let Some(control) = &product.control {
        write(writer, Event::Start(BytesStart::new("app:control")))?;
        if control.draft {
            text_element(writer, BytesStart::new("app:draft"), "yes")?;
        }
        let destinations = [
            ("sc:required_destination", &control.required_destinations),
            ("sc:validate_destination", &control.validate_destinations),
            ("sc:excluded_destination", &control.excluded_destinations),
        ];
        for (name, dests) in destinations {
            for dest in dests {
                let mut start = BytesStart::new(name);
                start.push_attribute(("dest", dest.as_str()));
                write(writer, Event::Empty(start))?;
            }
        }
        write(writer, Event::End(BytesEnd::new("app:control")))?;
    }
    Ok(())
}

fn push_opt(start: &mut BytesStart<'_>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        start.push_attribute((key, value));
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}
