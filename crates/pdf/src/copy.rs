use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;

/// Page attributes a page may inherit from its ancestors in the page tree
const INHERITABLE: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Resources", b"Rotate"];

/// Copies objects from a source document into a target document
///
/// `id_map` persists across calls so resources shared by several pages are
/// copied once. Callers seed it with every source page and page tree node
/// (see [`page_tree_map`]) so references between pages never pull another
/// page into the output.
pub(crate) struct ObjectCopier<'a> {
    source: &'a Document,
    target: &'a mut Document,
    id_map: &'a mut HashMap<ObjectId, ObjectId>,
}

impl<'a> ObjectCopier<'a> {
    pub(crate) fn new(
        source: &'a Document,
        target: &'a mut Document,
        id_map: &'a mut HashMap<ObjectId, ObjectId>,
    ) -> Self {
        Self { source, target, id_map }
    }

    /// Copy one page with its inherited attributes resolved
    ///
    /// The page's `/Parent` is dropped; the caller links the copy into the
    /// output page tree. The copy fills the slot reserved for `page_id`, so
    /// references to the page from anywhere (annotation `/P`, link `/Dest`)
    /// resolve to it.
    pub(crate) fn copy_page(&mut self, page_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        let mut page = resolved_page(self.source, page_id)?;
        page.remove(b"Parent");

        let new_id = match self.id_map.get(&page_id) {
            Some(id) => *id,
            None => {
                let id = self.target.add_object(Object::Null);
                self.id_map.insert(page_id, id);
                id
            }
        };

        let page = self.remap_references(Object::Dictionary(page))?;
        self.replace(new_id, page)?;
        Ok(new_id)
    }

    fn copy_object(&mut self, source_id: ObjectId) -> Result<ObjectId, lopdf::Error> {
        if let Some(target_id) = self.id_map.get(&source_id) {
            return Ok(*target_id);
        }

        // Reserve the target id first so reference cycles terminate.
        let new_id = self.target.add_object(Object::Null);
        self.id_map.insert(source_id, new_id);

        let object = self.source.get_object(source_id)?.clone();
        let object = self.remap_references(object)?;
        self.replace(new_id, object)?;
        Ok(new_id)
    }

    fn replace(&mut self, id: ObjectId, object: Object) -> Result<(), lopdf::Error> {
        let slot = self.target.objects.get_mut(&id).ok_or(lopdf::Error::ObjectNotFound(id))?;
        *slot = object;
        Ok(())
    }

    fn remap_references(&mut self, object: Object) -> Result<Object, lopdf::Error> {
        match object {
            Object::Reference(id) => Ok(Object::Reference(self.copy_object(id)?)),
            Object::Array(items) => Ok(Object::Array(
                items.into_iter().map(|item| self.remap_references(item)).collect::<Result<_, _>>()?,
            )),
            Object::Dictionary(mut dict) => {
                for (_, value) in dict.iter_mut() {
                    *value = self.remap_references(std::mem::replace(value, Object::Null))?;
                }
                Ok(Object::Dictionary(dict))
            }
            Object::Stream(mut stream) => {
                for (_, value) in stream.dict.iter_mut() {
                    *value = self.remap_references(std::mem::replace(value, Object::Null))?;
                }
                Ok(Object::Stream(stream))
            }
            other => Ok(other),
        }
    }
}

/// Reserve an output slot for every source page and point every page tree
/// node at the output's `/Pages` root
///
/// Slots of pages that are never appended stay `null`, so a link to a
/// deleted page dangles instead of dragging the page's content along.
pub(crate) fn page_tree_map(
    source: &Document,
    source_pages: &[ObjectId],
    target: &mut Document,
    pages_id: ObjectId,
) -> HashMap<ObjectId, ObjectId> {
    let mut id_map: HashMap<ObjectId, ObjectId> = source
        .objects
        .iter()
        .filter(|(_, object)| object.as_dict().is_ok_and(|dict| has_type(dict, b"Pages")))
        .map(|(id, _)| (*id, pages_id))
        .collect();
    for page_id in source_pages {
        id_map.insert(*page_id, target.add_object(Object::Null));
    }
    id_map
}

pub(crate) fn has_type(dict: &Dictionary, name: &[u8]) -> bool {
    dict.get(b"Type").and_then(Object::as_name).is_ok_and(|value| value == name)
}

/// Clone a page dictionary, pulling inheritable attributes down from its ancestors
pub(crate) fn resolved_page(doc: &Document, page_id: ObjectId) -> Result<Dictionary, lopdf::Error> {
    let mut page = doc.get_dictionary(page_id)?.clone();
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut visited = vec![page_id];

    while let Some(parent_id) = parent {
        if visited.contains(&parent_id) {
            break;
        }
        visited.push(parent_id);

        let node = doc.get_dictionary(parent_id)?;
        for key in INHERITABLE {
            if !page.has(key) {
                if let Ok(value) = node.get(key) {
                    page.set(key.to_vec(), value.clone());
                }
            }
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Ok(page)
}

/// Follow a reference to its object in `doc`, or return the object itself
pub(crate) fn resolve<'d>(doc: &'d Document, object: &'d Object) -> Result<&'d Object, lopdf::Error> {
    match object {
        Object::Reference(id) => doc.get_object(*id),
        other => Ok(other),
    }
}

/// Read a numeric object as `f32`
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}
