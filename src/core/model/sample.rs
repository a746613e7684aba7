use crate::core::model::{BookInfo, Isbn, Tags};

#[allow(clippy::too_many_arguments)]
fn book(
    title: &str,
    author: &str,
    isbn: &str,
    publish_year: i32,
    publisher: &str,
    description: &str,
    rating: f64,
    (total_copies, available_copies): (u32, u32),
    tags: &[&str],
) -> BookInfo {
    BookInfo {
        title: title.to_owned(),
        author: author.to_owned(),
        isbn: Isbn(isbn.to_owned()),
        category: "计算机科学".to_owned(),
        publish_year,
        publisher: publisher.to_owned(),
        description: Some(description.to_owned()),
        cover_url: None,
        rating,
        total_copies,
        available_copies,
        tags: Tags::new(tags.iter().map(|&tag| tag.to_owned()).collect()),
    }
}

/// The fixed starter catalog installed by `Command::SeedBooks`.
pub fn sample_books() -> Vec<BookInfo> {
    vec![
        book(
            "JavaScript高级程序设计",
            "Nicholas C. Zakas",
            "978-7-115-27579-0",
            2020,
            "人民邮电出版社",
            "全面深入地介绍了JavaScript语言的核心概念和高级特性。",
            4.8,
            (10, 3),
            &["编程", "JavaScript", "前端开发"],
        ),
        book(
            "React技术揭秘",
            "卡颂",
            "978-7-121-41234-5",
            2021,
            "电子工业出版社",
            "深入解析React框架的内部实现原理和最佳实践。",
            4.6,
            (8, 5),
            &["React", "前端框架", "源码分析"],
        ),
        book(
            "算法导论",
            "Thomas H. Cormen",
            "978-7-111-40701-0",
            2019,
            "机械工业出版社",
            "计算机算法领域的经典教材，涵盖了算法设计与分析的各个方面。",
            4.9,
            (15, 0),
            &["算法", "数据结构", "计算机理论"],
        ),
        book(
            "深入理解计算机系统",
            "Randal E. Bryant",
            "978-7-111-54493-7",
            2018,
            "机械工业出版社",
            "从程序员的角度深入理解计算机系统的工作原理。",
            4.7,
            (12, 2),
            &["计算机系统", "操作系统", "底层原理"],
        ),
        book(
            "设计模式",
            "Erich Gamma",
            "978-7-111-21116-6",
            2017,
            "机械工业出版社",
            "面向对象软件设计的经典之作，介绍了23种设计模式。",
            4.5,
            (6, 4),
            &["设计模式", "面向对象", "软件工程"],
        ),
        book(
            "Node.js实战",
            "Mike Cantelon",
            "978-7-115-35234-1",
            2022,
            "人民邮电出版社",
            "全面介绍Node.js开发的实战技巧和最佳实践。",
            4.4,
            (9, 6),
            &["Node.js", "后端开发", "JavaScript"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_books_respect_copy_invariants() {
        let books = sample_books();
        assert_eq!(books.len(), 6);
        for info in &books {
            assert!(info.total_copies >= 1);
            assert!(info.available_copies <= info.total_copies);
            assert!((0.0..=5.0).contains(&info.rating));
        }
    }
}
