use super::index_page::IndexPage;
use super::leaf_page::{LeafPage, check_key_field, tuple_key};
use super::ROOT_PAGE;
use crate::file::{BufferPool, PAGE_SIZE, Page, PageId};
use crate::record::{DbTable, RecordError, RecordResult, Tuple, TupleDesc, TupleId};

/// Result of inserting into a subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertOutcome {
    /// The subtree took the tuple without changing its parent
    Absorbed,
    /// The subtree root split; the parent must add `separator` -> `right`
    Split { separator: i32, right: usize },
}

/// Ordered table stored as a B+Tree on one INT field
///
/// A file with only the root page is an empty tree. The first insert turns
/// page 0 into a root over a single leaf at page 1. Full pages split as
/// soon as they fill, so a page is never full at the start of an insert.
#[derive(Debug, Clone)]
pub struct BTreeFile {
    name: String,
    desc: TupleDesc,
    key_index: usize,
}

impl BTreeFile {
    /// Create a B+Tree table over the page store registered as `name`
    /// The key field must be INT and at least two tuples must fit in a leaf
    pub fn new(name: impl Into<String>, desc: TupleDesc, key_index: usize) -> RecordResult<Self> {
        check_key_field(&desc, key_index)?;
        if LeafPage::calculate_capacity(desc.length()) < 2 {
            return Err(RecordError::TupleTooLarge(desc.length()));
        }

        Ok(Self {
            name: name.into(),
            desc,
            key_index,
        })
    }

    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Tuples per leaf for this table's schema
    pub fn leaf_capacity(&self) -> usize {
        LeafPage::calculate_capacity(self.desc.length())
    }

    fn page_id(&self, page: usize) -> PageId {
        PageId::new(self.name.as_str(), page)
    }

    fn is_empty(&self, pool: &BufferPool) -> RecordResult<bool> {
        Ok(pool.num_pages(&self.name)? <= 1)
    }

    /// Number of levels including the leaves, 0 for an empty tree
    pub fn height(&self, pool: &mut BufferPool) -> RecordResult<usize> {
        if self.is_empty(pool)? {
            return Ok(0);
        }

        let mut height = 1;
        let mut page = ROOT_PAGE;
        loop {
            height += 1;
            let index = IndexPage::new(pool.get_page(&self.page_id(page))?)?;
            if !index.index_children() {
                return Ok(height);
            }
            page = index.child(0);
        }
    }

    /// Point lookup by key
    pub fn search(&self, pool: &mut BufferPool, key: i32) -> RecordResult<Option<Tuple>> {
        if self.is_empty(pool)? {
            return Ok(None);
        }

        let leaf_page = self.find_leaf(pool, |index| index.child(index.find_child(key)))?;
        let leaf = LeafPage::new(
            pool.get_page(&self.page_id(leaf_page))?,
            &self.desc,
            self.key_index,
        )?;
        match leaf.search(key) {
            Ok(slot) => leaf.get_tuple(slot).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Descend from the root, picking a child at each level, down to a leaf
    fn find_leaf(
        &self,
        pool: &mut BufferPool,
        pick: impl Fn(&IndexPage<'_>) -> usize,
    ) -> RecordResult<usize> {
        let mut page = ROOT_PAGE;
        loop {
            let index = IndexPage::new(pool.get_page(&self.page_id(page))?)?;
            let child = pick(&index);
            if !index.index_children() {
                return Ok(child);
            }
            page = child;
        }
    }

    /// Seed an empty tree: root at page 0 over one leaf holding `tuple`
    fn insert_first(&self, pool: &mut BufferPool, tuple: &Tuple) -> RecordResult<()> {
        let leaf_page = pool.allocate_page(&self.name)?;
        {
            let buffer = pool.get_page_mut(&self.page_id(leaf_page))?;
            let mut leaf = LeafPage::new(buffer, &self.desc, self.key_index)?;
            leaf.init();
            leaf.insert_tuple(tuple)?;
        }

        let mut root = IndexPage::new(pool.get_page_mut(&self.page_id(ROOT_PAGE))?)?;
        root.init(false);
        root.set_child(0, leaf_page);
        Ok(())
    }

    fn insert_into(
        &self,
        pool: &mut BufferPool,
        page: usize,
        tuple: &Tuple,
        key: i32,
    ) -> RecordResult<InsertOutcome> {
        let (child, leaf_children) = {
            let index = IndexPage::new(pool.get_page(&self.page_id(page))?)?;
            (index.child(index.find_child(key)), !index.index_children())
        };

        let outcome = if leaf_children {
            self.insert_into_leaf(pool, child, tuple)?
        } else {
            self.insert_into(pool, child, tuple, key)?
        };

        let InsertOutcome::Split { separator, right } = outcome else {
            return Ok(InsertOutcome::Absorbed);
        };

        let mut index = IndexPage::new(pool.get_page_mut(&self.page_id(page))?)?;
        if !index.insert(separator, right)? {
            return Ok(InsertOutcome::Absorbed);
        }
        self.split_index(pool, page)
    }

    fn insert_into_leaf(
        &self,
        pool: &mut BufferPool,
        page: usize,
        tuple: &Tuple,
    ) -> RecordResult<InsertOutcome> {
        let leaf_id = self.page_id(page);
        let full = LeafPage::new(pool.get_page_mut(&leaf_id)?, &self.desc, self.key_index)?
            .insert_tuple(tuple)?;
        if !full {
            return Ok(InsertOutcome::Absorbed);
        }

        let right = pool.allocate_page(&self.name)?;
        let mut scratch: Page = [0u8; PAGE_SIZE];
        let separator = {
            let mut leaf = LeafPage::new(pool.get_page_mut(&leaf_id)?, &self.desc, self.key_index)?;
            let mut new_leaf = LeafPage::new(&mut scratch, &self.desc, self.key_index)?;
            new_leaf.init();
            leaf.split(&mut new_leaf, right)?
        };
        *pool.get_page_mut(&self.page_id(right))? = scratch;

        Ok(InsertOutcome::Split { separator, right })
    }

    fn split_index(&self, pool: &mut BufferPool, page: usize) -> RecordResult<InsertOutcome> {
        let right = pool.allocate_page(&self.name)?;
        let mut scratch: Page = [0u8; PAGE_SIZE];
        let separator = {
            let mut index = IndexPage::new(pool.get_page_mut(&self.page_id(page))?)?;
            let mut new_index = IndexPage::new(&mut scratch)?;
            index.split(&mut new_index)
        };
        *pool.get_page_mut(&self.page_id(right))? = scratch;

        Ok(InsertOutcome::Split { separator, right })
    }

    /// Move the old root to a fresh page and make page 0 a two-child root over it
    fn grow_root(&self, pool: &mut BufferPool, separator: i32, right: usize) -> RecordResult<()> {
        let left = pool.allocate_page(&self.name)?;
        let root_id = self.page_id(ROOT_PAGE);
        let old_root: Page = *pool.get_page(&root_id)?;
        *pool.get_page_mut(&self.page_id(left))? = old_root;

        let mut root = IndexPage::new(pool.get_page_mut(&root_id)?)?;
        root.init(true);
        root.set_child(0, left);
        root.insert(separator, right)?;
        Ok(())
    }
}

impl DbTable for BTreeFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    fn insert_tuple(&self, pool: &mut BufferPool, tuple: &Tuple) -> RecordResult<()> {
        let key = tuple_key(tuple, self.key_index)?;
        if !self.desc.compatible(tuple) {
            return Err(RecordError::SchemaMismatch(format!(
                "tuple with {} fields does not fit table {}",
                tuple.size(),
                self.name
            )));
        }

        if self.is_empty(pool)? {
            return self.insert_first(pool, tuple);
        }

        if let InsertOutcome::Split { separator, right } =
            self.insert_into(pool, ROOT_PAGE, tuple, key)?
        {
            self.grow_root(pool, separator, right)?;
        }
        Ok(())
    }

    /// Key deletion is not supported; the tree is left unchanged
    fn delete_tuple(&self, _pool: &mut BufferPool, _id: TupleId) -> RecordResult<()> {
        Ok(())
    }

    fn get_tuple(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<Tuple> {
        if id.page_id == ROOT_PAGE || id.page_id >= pool.num_pages(&self.name)? {
            return Err(RecordError::InvalidSlot(id.page_id, id.slot_id));
        }

        let buffer = pool.get_page(&self.page_id(id.page_id))?;
        LeafPage::new(buffer, &self.desc, self.key_index)?.get_tuple(id.slot_id)
    }

    fn begin(&self, pool: &mut BufferPool) -> RecordResult<TupleId> {
        if self.is_empty(pool)? {
            return self.end(pool);
        }

        let leaf_page = self.find_leaf(pool, |index| index.child(0))?;
        let leaf = LeafPage::new(
            pool.get_page(&self.page_id(leaf_page))?,
            &self.desc,
            self.key_index,
        )?;
        if leaf.size() == 0 {
            return self.end(pool);
        }
        Ok(TupleId::new(leaf_page, 0))
    }

    /// Page 0 is always the root, never a leaf
    fn end(&self, _pool: &mut BufferPool) -> RecordResult<TupleId> {
        Ok(TupleId::new(ROOT_PAGE, 0))
    }

    fn next(&self, pool: &mut BufferPool, id: TupleId) -> RecordResult<TupleId> {
        if id.page_id == ROOT_PAGE {
            return self.end(pool);
        }

        let leaf = LeafPage::new(
            pool.get_page(&self.page_id(id.page_id))?,
            &self.desc,
            self.key_index,
        )?;
        if id.slot_id + 1 < leaf.size() {
            return Ok(TupleId::new(id.page_id, id.slot_id + 1));
        }

        // next_leaf == 0 ends the chain, which is also the end cursor
        Ok(TupleId::new(leaf.next_leaf(), 0))
    }
}
